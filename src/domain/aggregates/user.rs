//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::UserId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub id_number: u64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub phone_number: String,
    pub role: Role,
    /// Cart total quoted during the checkout flow, reset once an order is placed.
    pub pending_total: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Staff,
    Employee,
    Admin,
}

impl Role {
    /// Role assigned at registration from the length of the campus id number:
    /// seven digits is a student id, eight digits is a staff id. Any other
    /// length falls back to student.
    pub fn default_for_id_number(id_number: u64) -> Role {
        match id_number.to_string().len() {
            7 => Role::Student,
            8 => Role::Staff,
            _ => Role::Student,
        }
    }

    /// Staff, employees and admins may act on other users' records.
    pub fn is_privileged(&self) -> bool { matches!(self, Self::Staff | Self::Employee | Self::Admin) }

    pub fn as_str(&self) -> &'static str {
        match self { Self::Student => "student", Self::Staff => "staff", Self::Employee => "employee", Self::Admin => "admin" }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = UserError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "staff" => Ok(Self::Staff),
            "employee" => Ok(Self::Employee),
            "admin" => Ok(Self::Admin),
            other => Err(UserError::UnknownRole(other.to_string())),
        }
    }
}

impl User {
    pub fn register(id_number: u64, email: impl Into<String>, phone_number: impl Into<String>) -> Result<Self, UserError> {
        let email = normalize_email(email.into())?;
        Ok(Self {
            id: Uuid::now_v7(), id_number, first_name: None, last_name: None, email,
            phone_number: phone_number.into(), role: Role::default_for_id_number(id_number),
            pending_total: Money::ZERO, created_at: Utc::now(),
        })
    }

    pub fn with_name(mut self, first: Option<String>, last: Option<String>) -> Self {
        self.first_name = first;
        self.last_name = last;
        self
    }

    /// Partial profile edit. Missing or blank fields keep their current value.
    pub fn update_profile(&mut self, changes: ProfileChanges) -> Result<(), UserError> {
        let keep = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        if let Some(email) = keep(changes.email) { self.email = normalize_email(email)?; }
        if let Some(first) = keep(changes.first_name) { self.first_name = Some(first); }
        if let Some(last) = keep(changes.last_name) { self.last_name = Some(last); }
        if let Some(phone) = keep(changes.phone_number) { self.phone_number = phone; }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

fn normalize_email(email: String) -> Result<String, UserError> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') { return Err(UserError::InvalidEmail); }
    Ok(email)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum UserError { InvalidEmail, UnknownRole(String) }
impl std::error::Error for UserError {}
impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::InvalidEmail => write!(f, "Invalid email"), Self::UnknownRole(r) => write!(f, "Unknown role '{r}'") }
    }
}
