//! Plan catalog
//!
//! Static mapping from plan identifier to credit bundle and price. The
//! catalog is built once at startup and shared read-only.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Minor units per major unit (paise per rupee)
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// A purchasable credit bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Plan {
    /// Case-sensitive identifier, e.g. "Basic"
    pub id: String,
    /// Credits granted when an order for this plan settles
    pub credits: i32,
    /// Price in minor currency units
    pub amount_minor: i64,
}

impl Plan {
    pub fn new(id: impl Into<String>, credits: i32, amount_minor: i64) -> Self {
        Self {
            id: id.into(),
            credits,
            amount_minor,
        }
    }

    /// Price in major units with two decimals, e.g. "499.00"
    pub fn display_amount(&self) -> String {
        format_minor_units(self.amount_minor)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Duplicate plan id: {0}")]
    DuplicatePlan(String),

    #[error("Plan {0} must grant positive credits for a positive amount")]
    InvalidPlan(String),
}

/// Immutable set of plans, kept in listing order
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build a catalog, rejecting duplicate ids and non-positive values
    pub fn new(plans: Vec<Plan>) -> Result<Self, CatalogError> {
        for (i, plan) in plans.iter().enumerate() {
            if plan.id.trim().is_empty() || plan.credits <= 0 || plan.amount_minor <= 0 {
                return Err(CatalogError::InvalidPlan(plan.id.clone()));
            }
            if plans[..i].iter().any(|p| p.id == plan.id) {
                return Err(CatalogError::DuplicatePlan(plan.id.clone()));
            }
        }
        Ok(Self { plans })
    }

    /// The three tiers sold by the service
    pub fn standard() -> Self {
        Self {
            plans: vec![
                Plan::new("Basic", 100, 49_900),
                Plan::new("Premium", 250, 89_900),
                Plan::new("Ultimate", 1000, 149_900),
            ],
        }
    }

    /// Exact, case-sensitive lookup
    pub fn lookup(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Render a minor-unit amount as a two-decimal major-unit string
pub fn format_minor_units(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    let per_major = MINOR_UNITS_PER_MAJOR.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / per_major, abs % per_major)
}
