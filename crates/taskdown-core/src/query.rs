use std::cmp::Ordering;

use chrono::NaiveDate;
use thiserror::Error;

use crate::dates::{self, DateRange};
use crate::task::{natural_id_cmp, Task};

/// Ceiling on DNF expansion. Nested OR groups multiply under AND, so a
/// pathological query could otherwise explode the group count unboundedly.
pub const MAX_FILTER_GROUPS: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("expected a filter before `{0}`")]
    ExpectedFilterBefore(String),
    #[error("expected a filter after `{0}`")]
    ExpectedFilterAfter(String),
    #[error("expected `)` to close the group")]
    UnclosedGroup,
    #[error("empty group: expected a filter inside `()`")]
    EmptyGroup,
    #[error("unexpected `)` with no open group")]
    UnexpectedClose,
    #[error("query expands to more than {0} filter groups")]
    TooManyGroups(usize),
    #[error("unknown sort key `{0}`")]
    UnknownSortKey(String),
}

/// Split a raw query string into tokens. `(`, `)` and `|` are standalone
/// regardless of surrounding whitespace; everything else splits on
/// whitespace.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    for ch in input.chars() {
        match ch {
            '(' | ')' | '|' => {
                if !buf.is_empty() {
                    tokens.push(std::mem::take(&mut buf));
                }
                tokens.push(ch.to_string());
            }
            c if c.is_whitespace() => {
                if !buf.is_empty() {
                    tokens.push(std::mem::take(&mut buf));
                }
            }
            c => buf.push(c),
        }
    }
    if !buf.is_empty() {
        tokens.push(buf);
    }
    tokens
}

fn is_or_token(token: &str) -> bool {
    token == "|" || token.eq_ignore_ascii_case("or")
}

fn is_filter_token(token: &str) -> bool {
    let mut parts = token.splitn(2, ':');
    let key = parts.next().unwrap_or("");
    let Some(value) = parts.next() else {
        return false;
    };
    !key.is_empty() && !value.is_empty() && !value.contains(':')
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Filter(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

struct Parser<'a> {
    tokens: &'a [String],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|t| t.as_str())
    }

    fn advance(&mut self) -> Option<&'a str> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// or := and ( ("|" | "OR") and )*
    fn parse_or(&mut self) -> Result<Expr, QueryError> {
        let mut terms = Vec::new();
        match self.parse_and()? {
            Some(expr) => terms.push(expr),
            None => {
                return Err(match self.peek() {
                    Some(")") if self.depth > 0 => QueryError::EmptyGroup,
                    Some(")") => QueryError::UnexpectedClose,
                    Some(token) => QueryError::ExpectedFilterBefore(token.to_string()),
                    None => QueryError::UnclosedGroup,
                })
            }
        }
        while self.peek().map(is_or_token).unwrap_or(false) {
            let op = self.advance().expect("peeked").to_string();
            match self.parse_and()? {
                Some(expr) => terms.push(expr),
                None => return Err(QueryError::ExpectedFilterAfter(op)),
            }
        }
        Ok(if terms.len() == 1 {
            terms.pop().expect("one term")
        } else {
            Expr::Or(terms)
        })
    }

    /// and := primary+ (juxtaposition). Returns `None` when no primary was
    /// consumed so the caller can name what it expected instead.
    fn parse_and(&mut self) -> Result<Option<Expr>, QueryError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some("(") => {
                    self.advance();
                    self.depth += 1;
                    let inner = self.parse_or()?;
                    self.depth -= 1;
                    match self.peek() {
                        Some(")") => {
                            self.advance();
                        }
                        _ => return Err(QueryError::UnclosedGroup),
                    }
                    items.push(inner);
                }
                Some(")") => break,
                Some(token) if is_or_token(token) => break,
                Some(filter) => {
                    items.push(Expr::Filter(filter.to_string()));
                    self.advance();
                }
                None => break,
            }
        }
        Ok(match items.len() {
            0 => None,
            1 => Some(items.pop().expect("one item")),
            _ => Some(Expr::And(items)),
        })
    }
}

/// Parse a raw query string into DNF filter groups: a list of AND-composed
/// token groups, any of which matching is sufficient. An empty query (or one
/// containing only discarded tokens) yields zero groups, which callers
/// interpret as "match everything".
pub fn parse_query_to_filter_groups(input: &str) -> Result<Vec<Vec<String>>, QueryError> {
    filter_groups_from_tokens(&tokenize(input))
}

/// Same as [`parse_query_to_filter_groups`] for pre-tokenized input.
///
/// Non-operator tokens that are not valid `key:value` filters (exactly one
/// colon, non-empty on both sides) are discarded before parsing; reinjecting
/// free text as explicit `text:` predicates is the caller's job.
pub fn filter_groups_from_tokens(tokens: &[String]) -> Result<Vec<Vec<String>>, QueryError> {
    let kept: Vec<String> = tokens
        .iter()
        .filter(|t| {
            let t = t.as_str();
            t == "(" || t == ")" || is_or_token(t) || is_filter_token(t)
        })
        .cloned()
        .collect();
    if kept.is_empty() {
        return Ok(Vec::new());
    }

    let mut parser = Parser {
        tokens: &kept,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if parser.peek().is_some() {
        return Err(QueryError::UnexpectedClose);
    }
    expand(&expr)
}

/// DNF expansion: OR concatenates child groups, AND takes the cross product.
fn expand(expr: &Expr) -> Result<Vec<Vec<String>>, QueryError> {
    let groups = match expr {
        Expr::Filter(token) => vec![vec![token.clone()]],
        Expr::Or(children) => {
            let mut out = Vec::new();
            for child in children {
                out.extend(expand(child)?);
                if out.len() > MAX_FILTER_GROUPS {
                    return Err(QueryError::TooManyGroups(MAX_FILTER_GROUPS));
                }
            }
            out
        }
        Expr::And(children) => {
            let mut acc: Vec<Vec<String>> = vec![Vec::new()];
            for child in children {
                let rhs = expand(child)?;
                let mut next = Vec::with_capacity(acc.len() * rhs.len());
                for left in &acc {
                    for right in &rhs {
                        let mut group = left.clone();
                        group.extend(right.iter().cloned());
                        next.push(group);
                    }
                }
                if next.len() > MAX_FILTER_GROUPS {
                    return Err(QueryError::TooManyGroups(MAX_FILTER_GROUPS));
                }
                acc = next;
            }
            acc
        }
    };
    Ok(groups)
}

/// Which completion states a call site treats as the implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDefault {
    Open,
    Done,
    All,
}

impl StatusDefault {
    fn token(self) -> &'static str {
        match self {
            StatusDefault::Open => "status:open",
            StatusDefault::Done => "status:done",
            StatusDefault::All => "status:all",
        }
    }
}

/// Add the caller's status default to every group that does not constrain
/// status itself. Runs on raw token groups, before compilation, because
/// different call sites default differently (list: open, search: all).
pub fn inject_default_status(groups: &mut [Vec<String>], default: StatusDefault) {
    for group in groups.iter_mut() {
        if !group.iter().any(|token| token.starts_with("status:")) {
            group.push(default.token().to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Open,
    Done,
    All,
}

/// One compiled predicate. Unknown keys and unresolvable values become
/// [`FilterKind::Noop`], the explicit forward-compatible default arm.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    Project(Vec<String>),
    Area(Vec<String>),
    Energy(Vec<String>),
    Priority(Vec<String>),
    Due(DateRange),
    Plan(DateRange),
    Created(DateRange),
    Updated(DateRange),
    Bucket {
        include: Vec<String>,
        exclude: Vec<String>,
    },
    Overdue {
        want: bool,
        today: NaiveDate,
    },
    Status(StatusFilter),
    Tags(Vec<String>),
    Parent(Vec<String>),
    TopLevel(bool),
    Text(String),
    Noop,
}

fn split_values(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn compile_token(token: &str, today: NaiveDate) -> FilterKind {
    let Some((key, value)) = token.split_once(':') else {
        return FilterKind::Noop;
    };
    match key {
        "project" => FilterKind::Project(split_values(value)),
        "area" => FilterKind::Area(split_values(value)),
        "energy" => FilterKind::Energy(split_values(value)),
        "priority" => FilterKind::Priority(split_values(value)),
        "due" => dates::resolve(value, today)
            .map(FilterKind::Due)
            .unwrap_or(FilterKind::Noop),
        "plan" => dates::resolve(value, today)
            .map(FilterKind::Plan)
            .unwrap_or(FilterKind::Noop),
        "created" => dates::resolve(value, today)
            .map(FilterKind::Created)
            .unwrap_or(FilterKind::Noop),
        "updated" => dates::resolve(value, today)
            .map(FilterKind::Updated)
            .unwrap_or(FilterKind::Noop),
        "bucket" => {
            let mut include = Vec::new();
            let mut exclude = Vec::new();
            for raw in value.split(',') {
                let raw = raw.trim().to_ascii_lowercase();
                if let Some(stripped) = raw.strip_prefix('!') {
                    if !stripped.is_empty() {
                        exclude.push(stripped.to_string());
                    }
                } else if !raw.is_empty() {
                    include.push(raw);
                }
            }
            FilterKind::Bucket { include, exclude }
        }
        "overdue" => parse_bool(value)
            .map(|want| FilterKind::Overdue { want, today })
            .unwrap_or(FilterKind::Noop),
        "status" => match value.trim().to_ascii_lowercase().as_str() {
            "open" => FilterKind::Status(StatusFilter::Open),
            "done" => FilterKind::Status(StatusFilter::Done),
            "all" => FilterKind::Status(StatusFilter::All),
            _ => FilterKind::Noop,
        },
        "tags" | "tag" => FilterKind::Tags(split_values(value)),
        "parent" => FilterKind::Parent(split_values(value)),
        "top-level" => parse_bool(value)
            .map(FilterKind::TopLevel)
            .unwrap_or(FilterKind::Noop),
        "text" => FilterKind::Text(value.to_lowercase()),
        _ => FilterKind::Noop,
    }
}

fn eq_any(values: &[String], candidate: &str) -> bool {
    values.iter().any(|v| v.eq_ignore_ascii_case(candidate))
}

impl FilterKind {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            FilterKind::Project(values) => eq_any(values, &task.project_id),
            FilterKind::Area(values) => task
                .area
                .as_deref()
                .map(|area| eq_any(values, area))
                .unwrap_or(false),
            FilterKind::Energy(values) => eq_any(values, &task.energy),
            FilterKind::Priority(values) => task
                .priority
                .as_deref()
                .map(|p| eq_any(values, p))
                .unwrap_or(false),
            FilterKind::Due(range) => task
                .due
                .as_deref()
                .map(|d| range.contains_str(d))
                .unwrap_or(false),
            FilterKind::Plan(range) => task
                .plan
                .as_deref()
                .map(|d| range.contains_str(d))
                .unwrap_or(false),
            FilterKind::Created(range) => task
                .created
                .as_deref()
                .map(|d| range.contains_str(d))
                .unwrap_or(false),
            FilterKind::Updated(range) => task
                .updated
                .as_deref()
                .map(|d| range.contains_str(d))
                .unwrap_or(false),
            FilterKind::Bucket { include, exclude } => {
                let bucket = task.bucket.as_deref();
                if include.is_empty() {
                    bucket.map(|b| !eq_any(exclude, b)).unwrap_or(true)
                } else {
                    bucket
                        .map(|b| eq_any(include, b) && !eq_any(exclude, b))
                        .unwrap_or(false)
                }
            }
            FilterKind::Overdue { want, today } => {
                let overdue = !task.completed
                    && task
                        .due
                        .as_deref()
                        .and_then(dates::parse_date)
                        .map(|due| due < *today)
                        .unwrap_or(false);
                overdue == *want
            }
            FilterKind::Status(filter) => match filter {
                StatusFilter::Open => !task.completed,
                StatusFilter::Done => task.completed,
                StatusFilter::All => true,
            },
            FilterKind::Tags(values) => task.tags.iter().any(|tag| eq_any(values, tag)),
            FilterKind::Parent(values) => task
                .parent_id
                .as_deref()
                .map(|parent| {
                    let local = parent.split_once(':').map(|(_, l)| l).unwrap_or(parent);
                    eq_any(values, parent) || eq_any(values, local)
                })
                .unwrap_or(false),
            FilterKind::TopLevel(want) => task.parent_id.is_none() == *want,
            FilterKind::Text(needle) => task.text.to_lowercase().contains(needle),
            FilterKind::Noop => true,
        }
    }
}

/// A query compiled down to predicate groups: OR across groups, AND within.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    groups: Vec<Vec<FilterKind>>,
}

impl CompiledQuery {
    /// Matches iff at least one group's predicates all match. An empty group
    /// list matches nothing; callers wanting "match everything" normalize to
    /// a single empty group first.
    pub fn matches(&self, task: &Task) -> bool {
        self.groups
            .iter()
            .any(|group| group.iter().all(|pred| pred.matches(task)))
    }

    pub fn groups(&self) -> &[Vec<FilterKind>] {
        &self.groups
    }
}

/// Compile raw token groups against an evaluation date. Date predicates are
/// resolved here, so results are only as fresh as `today`.
pub fn compile_filter_groups(groups: &[Vec<String>], today: NaiveDate) -> CompiledQuery {
    CompiledQuery {
        groups: groups
            .iter()
            .map(|group| group.iter().map(|t| compile_token(t, today)).collect())
            .collect(),
    }
}

/// Parse, normalize and compile in one step: empty queries become the single
/// empty (match-everything) group, then the status default is injected.
pub fn compile_query(
    input: &str,
    default: StatusDefault,
    today: NaiveDate,
) -> Result<CompiledQuery, QueryError> {
    let mut groups = parse_query_to_filter_groups(input)?;
    if groups.is_empty() {
        groups.push(Vec::new());
    }
    inject_default_status(&mut groups, default);
    Ok(compile_filter_groups(&groups, today))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Project,
    Due,
    Plan,
    Created,
    Updated,
    Priority,
    Energy,
    Bucket,
    Text,
    Id,
}

impl SortKey {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "project" => Some(SortKey::Project),
            "due" => Some(SortKey::Due),
            "plan" => Some(SortKey::Plan),
            "created" => Some(SortKey::Created),
            "updated" => Some(SortKey::Updated),
            "priority" => Some(SortKey::Priority),
            "energy" => Some(SortKey::Energy),
            "bucket" => Some(SortKey::Bucket),
            "text" => Some(SortKey::Text),
            "id" => Some(SortKey::Id),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SortKey::Project => "project",
            SortKey::Due => "due",
            SortKey::Plan => "plan",
            SortKey::Created => "created",
            SortKey::Updated => "updated",
            SortKey::Priority => "priority",
            SortKey::Energy => "energy",
            SortKey::Bucket => "bucket",
            SortKey::Text => "text",
            SortKey::Id => "id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

/// Parse `field` / `field:desc` specs from a comma-separated list.
pub fn parse_sort_specs(input: &str) -> Result<Vec<SortSpec>, QueryError> {
    let mut specs = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, direction) = match part.split_once(':') {
            Some((name, dir)) if dir.eq_ignore_ascii_case("desc") => (name, SortDirection::Desc),
            Some((name, dir)) if dir.eq_ignore_ascii_case("asc") => (name, SortDirection::Asc),
            Some(_) => return Err(QueryError::UnknownSortKey(part.to_string())),
            None => (part, SortDirection::Asc),
        };
        let key = SortKey::parse(name).ok_or_else(|| QueryError::UnknownSortKey(name.to_string()))?;
        specs.push(SortSpec {
            key,
            direction,
        });
    }
    Ok(specs)
}

const ENERGY_ORDER: [&str; 3] = ["low", "normal", "high"];
const BUCKET_ORDER: [&str; 5] = ["now", "today", "upcoming", "anytime", "someday"];

/// Rank against a known-value table: known values in table order, unknown
/// values after them ordered lexically.
fn rank(table: &[&str], value: &str) -> (usize, String) {
    let lowered = value.to_ascii_lowercase();
    match table.iter().position(|known| *known == lowered) {
        Some(idx) => (idx, String::new()),
        None => (table.len(), lowered),
    }
}

fn date_of(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(dates::parse_date)
}

fn compare_by_key(a: &Task, b: &Task, spec: SortSpec) -> Ordering {
    let ordering = match spec.key {
        SortKey::Project => a.project_id.cmp(&b.project_id),
        SortKey::Due => return cmp_missing_last(date_of(a.due.as_deref()), date_of(b.due.as_deref()), spec.direction),
        SortKey::Plan => return cmp_missing_last(date_of(a.plan.as_deref()), date_of(b.plan.as_deref()), spec.direction),
        SortKey::Created => {
            return cmp_missing_last(
                date_of(a.created.as_deref()),
                date_of(b.created.as_deref()),
                spec.direction,
            )
        }
        SortKey::Updated => {
            return cmp_missing_last(
                date_of(a.updated.as_deref()),
                date_of(b.updated.as_deref()),
                spec.direction,
            )
        }
        SortKey::Priority => {
            return cmp_missing_last(
                a.priority.as_deref().map(|p| p.to_ascii_lowercase()),
                b.priority.as_deref().map(|p| p.to_ascii_lowercase()),
                spec.direction,
            )
        }
        SortKey::Energy => rank(&ENERGY_ORDER, &a.energy).cmp(&rank(&ENERGY_ORDER, &b.energy)),
        SortKey::Bucket => {
            return cmp_missing_last(
                a.bucket.as_deref().map(|v| rank(&BUCKET_ORDER, v)),
                b.bucket.as_deref().map(|v| rank(&BUCKET_ORDER, v)),
                spec.direction,
            )
        }
        SortKey::Text => a.text.to_lowercase().cmp(&b.text.to_lowercase()),
        SortKey::Id => natural_id_cmp(&a.local_id, &b.local_id),
    };
    apply_direction(ordering, spec.direction)
}

fn apply_direction(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Missing values sort last regardless of direction.
fn cmp_missing_last<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => apply_direction(x.cmp(&y), direction),
    }
}

/// Stable multi-key sort with a deterministic final tie-break of
/// `(project_id, numeric-aware local_id, original index)`. Even a full tie
/// has a total order, which stable paging and row selection rely on.
pub fn sort_tasks(tasks: &mut Vec<&Task>, specs: &[SortSpec]) {
    let mut keyed: Vec<(usize, &Task)> = tasks.drain(..).enumerate().collect();
    keyed.sort_by(|(ai, a), (bi, b)| {
        for spec in specs {
            let ordering = compare_by_key(a, b, *spec);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.project_id
            .cmp(&b.project_id)
            .then_with(|| natural_id_cmp(&a.local_id, &b.local_id))
            .then_with(|| ai.cmp(bi))
    });
    tasks.extend(keyed.into_iter().map(|(_, task)| task));
}

fn group_label(task: &Task, key: SortKey) -> Option<String> {
    match key {
        SortKey::Project => Some(task.project_id.clone()),
        SortKey::Due => task.due.clone(),
        SortKey::Plan => task.plan.clone(),
        SortKey::Created => task.created.clone(),
        SortKey::Updated => task.updated.clone(),
        SortKey::Priority => task.priority.clone(),
        SortKey::Energy => Some(task.energy.clone()),
        SortKey::Bucket => task.bucket.clone(),
        SortKey::Text => Some(task.text.clone()),
        SortKey::Id => Some(task.global_id.clone()),
    }
}

/// Bucket tasks by the literal value of `key`, preserving the incoming
/// (already sorted) order both across and within buckets. Missing values
/// collect under a `(no <field>)` sentinel.
pub fn group_tasks<'a>(tasks: &[&'a Task], key: SortKey) -> Vec<(String, Vec<&'a Task>)> {
    let mut out: Vec<(String, Vec<&'a Task>)> = Vec::new();
    for task in tasks {
        let label = group_label(task, key).unwrap_or_else(|| format!("(no {})", key.name()));
        match out.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, bucket)) => bucket.push(task),
            None => out.push((label, vec![task])),
        }
    }
    out
}
