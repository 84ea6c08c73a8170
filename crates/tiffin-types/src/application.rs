//! Chef application types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review state of a chef application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
	Pending,
	Approved,
	Rejected,
}

impl ApplicationStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			ApplicationStatus::Pending => "pending",
			ApplicationStatus::Approved => "approved",
			ApplicationStatus::Rejected => "rejected",
		}
	}
}

impl fmt::Display for ApplicationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ApplicationStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(ApplicationStatus::Pending),
			"approved" => Ok(ApplicationStatus::Approved),
			"rejected" => Ok(ApplicationStatus::Rejected),
			other => Err(format!("Unknown application status: {}", other)),
		}
	}
}

/// Applicant details, fixed at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
	pub name: String,
	pub email: String,
	#[serde(default)]
	pub phone: Option<String>,
	/// Free-text location, usually a city or neighbourhood.
	pub location: String,
	#[serde(default)]
	pub cuisines: Vec<String>,
	#[serde(default)]
	pub years_experience: Option<u32>,
	#[serde(default)]
	pub bio: Option<String>,
}

/// A request to become a chef on the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChefApplication {
	pub id: String,
	pub applicant: ApplicantProfile,
	pub status: ApplicationStatus,
	/// Reviewer note. Present exactly when rejected.
	#[serde(default)]
	pub admin_notes: Option<String>,
	#[serde(default)]
	pub reviewed_by: Option<String>,
	pub submitted_at: DateTime<Utc>,
	#[serde(default)]
	pub decided_at: Option<DateTime<Utc>>,
}

impl ChefApplication {
	pub fn is_decided(&self) -> bool {
		self.status != ApplicationStatus::Pending
	}
}
