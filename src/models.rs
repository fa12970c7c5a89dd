use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::errors::AppError;

/// Coarse state given to every House placeholder at creation.
pub const HOUSE_STATE_PENDING: &str = "pending";
/// Unit sent to the vendor when the request omits one.
pub const DEFAULT_CONSUMPTION_UNIT: &str = "kwh";
/// Period sent to the vendor when the request omits one.
pub const DEFAULT_CONSUMPTION_PERIOD: &str = "year";

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

// ============ Database Models ============

/// A prospective solar installation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Lead {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owning project.
    pub project_id: i64,
    /// Owning user.
    pub user_id: Option<i64>,
    /// House placeholder created together with this lead.
    pub house_id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    /// Requested system size in kW.
    pub system_size: f64,
    pub panel_count: i32,
    pub hardware_type: Option<String>,
    /// Estimated usage in kWh per year.
    pub kwh_usage: f64,
    pub panel_id: Option<i64>,
    pub inverter_id: Option<i64>,
    /// Monthly consumption profile.
    pub consumption: Vec<i32>,
    pub period: String,
    /// Target solar offset in percent.
    pub target_solar_offset: i32,
    pub mode: Option<String>,
    pub unit: String,
    pub annual_production: f64,
    /// Utility (load-serving entity) resolved by tariff enrichment.
    pub utility_id: Option<i64>,
    /// Tariff resolved by tariff enrichment.
    pub tariff_id: Option<i64>,
    /// Vendor-side project id, set once the 3D project exists.
    pub external_id: Option<i64>,
    /// Per-user scoped idempotency key of the creating request.
    pub idempotency_key: Option<String>,
}

impl Lead {
    /// Checks the coordinate invariant. Runs before every write.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_coordinates(self.latitude, self.longitude)
    }
}

/// Insert payload for a Lead; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLead {
    pub project_id: i64,
    pub user_id: Option<i64>,
    pub house_id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub system_size: f64,
    pub panel_count: i32,
    pub hardware_type: Option<String>,
    pub kwh_usage: f64,
    pub panel_id: Option<i64>,
    pub inverter_id: Option<i64>,
    pub consumption: Vec<i32>,
    pub period: String,
    pub target_solar_offset: i32,
    pub mode: Option<String>,
    pub unit: String,
    pub annual_production: f64,
    pub external_id: Option<i64>,
    pub idempotency_key: Option<String>,
}

impl NewLead {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_coordinates(self.latitude, self.longitude)
    }

    /// Materializes the stored row.
    pub fn into_lead(self, id: i64, now: DateTime<Utc>) -> Lead {
        Lead {
            id,
            created_at: now,
            updated_at: now,
            project_id: self.project_id,
            user_id: self.user_id,
            house_id: self.house_id,
            latitude: self.latitude,
            longitude: self.longitude,
            system_size: self.system_size,
            panel_count: self.panel_count,
            hardware_type: self.hardware_type,
            kwh_usage: self.kwh_usage,
            panel_id: self.panel_id,
            inverter_id: self.inverter_id,
            consumption: self.consumption,
            period: self.period,
            target_solar_offset: self.target_solar_offset,
            mode: self.mode,
            unit: self.unit,
            annual_production: self.annual_production,
            utility_id: None,
            tariff_id: None,
            external_id: self.external_id,
            idempotency_key: self.idempotency_key,
        }
    }
}

/// Physical-site placeholder created alongside a Lead.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct House {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    pub diameter: f64,
    pub probability: f64,
    pub state: String,
    pub tile_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewHouse {
    pub lat: f64,
    pub lng: f64,
    pub state: String,
}

impl NewHouse {
    pub fn pending(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            state: HOUSE_STATE_PENDING.to_string(),
        }
    }

    pub fn into_house(self, id: i64, now: DateTime<Utc>) -> House {
        House {
            id,
            created_at: now,
            updated_at: now,
            lat: self.lat,
            lng: self.lng,
            diameter: 0.0,
            probability: 0.0,
            state: self.state,
            tile_id: None,
        }
    }
}

/// User profile fields the orchestrator needs for the vendor payload.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub status: String,
}

/// Rejects coordinates outside the valid geographic range (NaN included).
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::BadRequest(
            "latitude must be between -90 and 90".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::BadRequest(
            "longitude must be between -180 and 180".to_string(),
        ));
    }
    Ok(())
}

// ============ API Request/Response Models ============

/// Body of `POST /api/leads`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateLeadRequest {
    #[schema(example = 1)]
    pub project_id: Option<i64>,
    /// Used only when the auth layer did not supply `X-User-Id`.
    pub user_id: Option<i64>,
    #[schema(example = 37.7749)]
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    #[schema(example = 10.5)]
    pub system_size: f64,
    #[serde(default)]
    #[schema(example = 30)]
    pub panel_count: i32,
    pub hardware_type: Option<String>,
    #[serde(default)]
    #[schema(example = 12000)]
    pub kwh_usage: f64,
    #[serde(default)]
    pub consumption: Vec<i32>,
    pub lse_id: Option<i64>,
    pub period: Option<String>,
    #[serde(default)]
    pub target_solar_offset: i32,
    pub mode: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreateLeadResponse {
    pub success: bool,
    pub lead_id: i64,
    pub house_id: i64,
}

/// Field patch accepted by `PUT /api/leads/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LeadPatch {
    pub kwh_usage: Option<f64>,
    pub system_size: Option<f64>,
    pub panel_count: Option<i32>,
    pub annual_production: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub target_solar_offset: Option<i32>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        self.kwh_usage.is_none()
            && self.system_size.is_none()
            && self.panel_count.is_none()
            && self.annual_production.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.target_solar_offset.is_none()
    }

    pub fn apply(&self, lead: &mut Lead) {
        if let Some(v) = self.kwh_usage {
            lead.kwh_usage = v;
        }
        if let Some(v) = self.system_size {
            lead.system_size = v;
        }
        if let Some(v) = self.panel_count {
            lead.panel_count = v;
        }
        if let Some(v) = self.annual_production {
            lead.annual_production = v;
        }
        if let Some(v) = self.latitude {
            lead.latitude = v;
        }
        if let Some(v) = self.longitude {
            lead.longitude = v;
        }
        if let Some(v) = self.target_solar_offset {
            lead.target_solar_offset = v;
        }
    }
}

/// Query string of `GET /api/leads`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListLeadsQuery {
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Normalized listing filter handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadFilter {
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl From<ListLeadsQuery> for LeadFilter {
    /// Out-of-range paging values fall back to defaults.
    fn from(q: ListLeadsQuery) -> Self {
        let limit = q
            .limit
            .filter(|l| *l > 0 && *l <= MAX_PAGE_LIMIT)
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = q.offset.filter(|o| *o >= 0).unwrap_or(0);
        Self {
            project_id: q.project_id,
            user_id: q.user_id,
            limit,
            offset,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeadPage {
    pub leads: Vec<Lead>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
