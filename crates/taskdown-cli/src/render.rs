use taskdown_core::stats::StatsReport;
use taskdown_core::task::Task;

pub fn task_line(task: &Task) -> String {
    let marker = if task.completed { "x" } else { " " };
    let mut extras: Vec<String> = Vec::new();
    if let Some(due) = task.due.as_deref() {
        extras.push(format!("due:{}", due));
    }
    if let Some(plan) = task.plan.as_deref() {
        extras.push(format!("plan:{}", plan));
    }
    if let Some(bucket) = task.bucket.as_deref() {
        extras.push(format!("bucket:{}", bucket));
    }
    if let Some(priority) = task.priority.as_deref() {
        extras.push(format!("priority:{}", priority));
    }
    if !task.tags.is_empty() {
        extras.push(format!("tags:{}", task.tags.join(",")));
    }
    let suffix = if extras.is_empty() {
        String::new()
    } else {
        format!("  ({})", extras.join(" "))
    };
    format!("[{}] {:<14} {}{}", marker, task.global_id, task.text, suffix)
}

pub fn print_tasks(tasks: &[&Task]) {
    if tasks.is_empty() {
        println!("No matching tasks.");
        return;
    }
    for task in tasks {
        println!("{}", task_line(task));
    }
}

pub fn print_grouped(groups: &[(String, Vec<&Task>)]) {
    if groups.is_empty() {
        println!("No matching tasks.");
        return;
    }
    for (idx, (label, tasks)) in groups.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        println!("{} ({})", label, tasks.len());
        for task in tasks {
            println!("  {}", task_line(task));
        }
    }
}

pub fn print_stats(report: &StatsReport) {
    println!(
        "Tasks: {} total ({} open, {} done)",
        report.total.total, report.total.open, report.total.done
    );
    if !report.by_project.is_empty() {
        println!();
        println!("By project:");
        for (project, lane) in &report.by_project {
            println!("  {:<16} {} open / {} done", project, lane.open, lane.done);
        }
    }
    if !report.by_bucket.is_empty() {
        println!();
        println!("By bucket:");
        for (bucket, lane) in &report.by_bucket {
            println!("  {:<16} {} open / {} done", bucket, lane.open, lane.done);
        }
    }
    if !report.by_area.is_empty() {
        println!();
        println!("By area:");
        for (area, lane) in &report.by_area {
            println!("  {:<16} {} open / {} done", area, lane.open, lane.done);
        }
    }
}
