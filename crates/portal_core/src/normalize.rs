//! Schema normalization of raw domain records.
//!
//! # Responsibility
//! - Validate and coerce untyped source records into canonical entities.
//! - Stamp the provenance tag that belongs to each entity kind.
//!
//! # Invariants
//! - Pure: no I/O, no logging, no shared state.
//! - A record either normalizes completely or yields a `ValidationError`;
//!   there is no partially-normalized output.
//! - Source-supplied provenance fields are ignored.

use crate::model::entities::{
    Employee, EntityKind, Expense, Project, Task, UnifiedBatch,
};
use crate::model::money::Money;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Untyped key-value record as delivered by a domain store.
pub type RawRecord = Map<String, Value>;

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw feeds for one load, prior to normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub employees: Vec<RawRecord>,
    pub projects: Vec<RawRecord>,
    pub expenses: Vec<RawRecord>,
    pub tasks: Vec<RawRecord>,
}

/// What is wrong with one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    Missing,
    WrongType { expected: &'static str },
    Constraint(&'static str),
}

/// A raw record that cannot be turned into a canonical entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub entity: EntityKind,
    /// Source id of the offending record when it could be read.
    pub record_id: Option<i64>,
    pub field: &'static str,
    pub issue: ValidationIssue,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let record = match self.record_id {
            Some(id) => format!("{} {id}", self.entity.as_str()),
            None => format!("{} (unknown id)", self.entity.as_str()),
        };
        match &self.issue {
            ValidationIssue::Missing => {
                write!(f, "{record}: required field `{}` is missing", self.field)
            }
            ValidationIssue::WrongType { expected } => {
                write!(f, "{record}: field `{}` must be {expected}", self.field)
            }
            ValidationIssue::Constraint(rule) => {
                write!(f, "{record}: field `{}` {rule}", self.field)
            }
        }
    }
}

impl Error for ValidationError {}

pub type NormalizeResult<T> = Result<T, ValidationError>;

/// Field reader bound to one raw record.
struct Fields<'a> {
    raw: &'a RawRecord,
    entity: EntityKind,
    record_id: Option<i64>,
}

impl<'a> Fields<'a> {
    fn new(raw: &'a RawRecord, entity: EntityKind) -> Self {
        Self {
            raw,
            entity,
            record_id: raw.get("id").and_then(Value::as_i64),
        }
    }

    fn fail(&self, field: &'static str, issue: ValidationIssue) -> ValidationError {
        ValidationError {
            entity: self.entity,
            record_id: self.record_id,
            field,
            issue,
        }
    }

    fn present(&self, field: &'static str) -> NormalizeResult<&'a Value> {
        match self.raw.get(field) {
            None | Some(Value::Null) => Err(self.fail(field, ValidationIssue::Missing)),
            Some(value) => Ok(value),
        }
    }

    fn id(&self, field: &'static str) -> NormalizeResult<i64> {
        self.present(field)?.as_i64().ok_or_else(|| {
            self.fail(
                field,
                ValidationIssue::WrongType {
                    expected: "an integer",
                },
            )
        })
    }

    fn text(&self, field: &'static str) -> NormalizeResult<String> {
        let value = self.present(field)?.as_str().ok_or_else(|| {
            self.fail(field, ValidationIssue::WrongType { expected: "a string" })
        })?;
        if value.trim().is_empty() {
            return Err(self.fail(field, ValidationIssue::Constraint("must not be blank")));
        }
        Ok(value.to_string())
    }

    fn optional_text(&self, field: &'static str) -> NormalizeResult<Option<String>> {
        match self.raw.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(self.fail(
                field,
                ValidationIssue::WrongType {
                    expected: "a string or null",
                },
            )),
        }
    }

    fn non_negative_money(&self, field: &'static str) -> NormalizeResult<Money> {
        let wrong_type = || {
            self.fail(
                field,
                ValidationIssue::WrongType {
                    expected: "a decimal number",
                },
            )
        };
        let parsed = match self.present(field)? {
            Value::Number(number) => Money::parse_decimal(&number.to_string()),
            Value::String(text) => Money::parse_decimal(text),
            _ => return Err(wrong_type()),
        }
        .map_err(|_| wrong_type())?;

        if parsed.is_negative() {
            return Err(self.fail(field, ValidationIssue::Constraint("must not be negative")));
        }
        Ok(parsed)
    }

    fn date(&self, field: &'static str) -> NormalizeResult<NaiveDate> {
        self.present(field)?
            .as_str()
            .and_then(|text| NaiveDate::parse_from_str(text.trim(), ISO_DATE_FORMAT).ok())
            .ok_or_else(|| {
                self.fail(
                    field,
                    ValidationIssue::WrongType {
                        expected: "an ISO date (YYYY-MM-DD)",
                    },
                )
            })
    }
}

pub fn normalize_employee(raw: &RawRecord) -> NormalizeResult<Employee> {
    let kind = EntityKind::Employee;
    let fields = Fields::new(raw, kind);
    Ok(Employee {
        id: fields.id("id")?,
        name: fields.text("name")?,
        role: fields.text("role")?,
        department: fields.text("department")?,
        provenance: kind.provenance(),
    })
}

pub fn normalize_project(raw: &RawRecord) -> NormalizeResult<Project> {
    let kind = EntityKind::Project;
    let fields = Fields::new(raw, kind);
    Ok(Project {
        id: fields.id("id")?,
        name: fields.text("name")?,
        total_budget: fields.non_negative_money("total_budget")?,
        provenance: kind.provenance(),
    })
}

pub fn normalize_expense(raw: &RawRecord) -> NormalizeResult<Expense> {
    let kind = EntityKind::Expense;
    let fields = Fields::new(raw, kind);
    Ok(Expense {
        id: fields.id("id")?,
        project_id: fields.id("project_id")?,
        vendor: fields.optional_text("vendor")?,
        description: fields.optional_text("description")?,
        amount: fields.non_negative_money("amount")?,
        status: fields.text("status")?,
        date: fields.date("date")?,
        provenance: kind.provenance(),
    })
}

pub fn normalize_task(raw: &RawRecord) -> NormalizeResult<Task> {
    let kind = EntityKind::Task;
    let fields = Fields::new(raw, kind);
    Ok(Task {
        id: fields.id("id")?,
        project_id: fields.id("project_id")?,
        assignee_id: fields.id("assignee_id")?,
        task_name: fields.text("task_name")?,
        status: fields.text("status")?,
        blocker_notes: fields.optional_text("blocker_notes")?,
        provenance: kind.provenance(),
    })
}

/// Normalizes all four feeds, stopping at the first invalid record.
pub fn normalize_batch(raw: &RawBatch) -> NormalizeResult<UnifiedBatch> {
    Ok(UnifiedBatch {
        employees: normalize_all(&raw.employees, normalize_employee)?,
        projects: normalize_all(&raw.projects, normalize_project)?,
        expenses: normalize_all(&raw.expenses, normalize_expense)?,
        tasks: normalize_all(&raw.tasks, normalize_task)?,
    })
}

fn normalize_all<T>(
    records: &[RawRecord],
    normalize: fn(&RawRecord) -> NormalizeResult<T>,
) -> NormalizeResult<Vec<T>> {
    records.iter().map(normalize).collect()
}
