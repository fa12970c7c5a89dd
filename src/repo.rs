use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::{AppError, ResultExt};
use crate::models::{House, Lead, LeadFilter, NewHouse, NewLead, User};

/// Persistence seam for Lead records.
///
/// Implementations must run `validate()` before any write so that an
/// out-of-range coordinate never reaches storage.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn create_lead(&self, lead: NewLead) -> Result<Lead, AppError>;
    async fn get_lead(&self, id: i64) -> Result<Lead, AppError>;
    /// Returns the requested page and the total number of matching rows.
    async fn list_leads(&self, filter: LeadFilter) -> Result<(Vec<Lead>, i64), AppError>;
    async fn update_lead(&self, lead: &Lead) -> Result<Lead, AppError>;
    async fn delete_lead(&self, id: i64) -> Result<(), AppError>;
    async fn find_lead_by_idempotency_key(&self, key: &str) -> Result<Option<Lead>, AppError>;
}

#[async_trait]
pub trait HouseStore: Send + Sync {
    async fn create_house(&self, house: NewHouse) -> Result<House, AppError>;
    async fn get_house(&self, id: i64) -> Result<House, AppError>;
    async fn delete_house(&self, id: i64) -> Result<(), AppError>;
}

/// Read-only view over users and projects.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn project_exists(&self, id: i64) -> Result<bool, AppError>;
    async fn user_exists(&self, id: i64) -> Result<bool, AppError>;
    async fn get_user(&self, id: i64) -> Result<User, AppError>;
}

const LEAD_COLUMNS: &str = "id, created_at, updated_at, project_id, user_id, house_id, \
    latitude, longitude, system_size, panel_count, hardware_type, kwh_usage, panel_id, \
    inverter_id, consumption, period, target_solar_offset, mode, unit, annual_production, \
    utility_id, tariff_id, external_id, idempotency_key";

const HOUSE_COLUMNS: &str =
    "id, created_at, updated_at, lat, lng, diameter, probability, state, tile_id";

fn map_write_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("lead with this idempotency key already exists".to_string())
        }
        _ => AppError::DatabaseError(err),
    }
}

/// Postgres-backed Lead store.
#[derive(Clone)]
pub struct PgLeadRepo {
    pool: PgPool,
}

impl PgLeadRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadRepo {
    async fn create_lead(&self, lead: NewLead) -> Result<Lead, AppError> {
        lead.validate()?;

        let sql = format!(
            r#"
            INSERT INTO leads (
                project_id, user_id, house_id, latitude, longitude, system_size,
                panel_count, hardware_type, kwh_usage, panel_id, inverter_id,
                consumption, period, target_solar_offset, mode, unit,
                annual_production, external_id, idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        let created = sqlx::query_as::<_, Lead>(&sql)
            .bind(lead.project_id)
            .bind(lead.user_id)
            .bind(lead.house_id)
            .bind(lead.latitude)
            .bind(lead.longitude)
            .bind(lead.system_size)
            .bind(lead.panel_count)
            .bind(&lead.hardware_type)
            .bind(lead.kwh_usage)
            .bind(lead.panel_id)
            .bind(lead.inverter_id)
            .bind(&lead.consumption)
            .bind(&lead.period)
            .bind(lead.target_solar_offset)
            .bind(&lead.mode)
            .bind(&lead.unit)
            .bind(lead.annual_production)
            .bind(lead.external_id)
            .bind(&lead.idempotency_key)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)?;

        tracing::debug!(lead_id = created.id, "Inserted lead");
        Ok(created)
    }

    async fn get_lead(&self, id: i64) -> Result<Lead, AppError> {
        let sql = format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS);
        sqlx::query_as::<_, Lead>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("loading lead {}", id))?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    async fn list_leads(&self, filter: LeadFilter) -> Result<(Vec<Lead>, i64), AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM leads
            WHERE ($1::BIGINT IS NULL OR project_id = $1)
              AND ($2::BIGINT IS NULL OR user_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
            LEAD_COLUMNS
        );

        let leads = sqlx::query_as::<_, Lead>(&sql)
            .bind(filter.project_id)
            .bind(filter.user_id)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await
            .context("listing leads")?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM leads
            WHERE ($1::BIGINT IS NULL OR project_id = $1)
              AND ($2::BIGINT IS NULL OR user_id = $2)
            "#,
        )
        .bind(filter.project_id)
        .bind(filter.user_id)
        .fetch_one(&self.pool)
        .await
        .context("counting leads")?;

        Ok((leads, total))
    }

    async fn update_lead(&self, lead: &Lead) -> Result<Lead, AppError> {
        lead.validate()?;

        let sql = format!(
            r#"
            UPDATE leads
            SET latitude = $2,
                longitude = $3,
                system_size = $4,
                panel_count = $5,
                kwh_usage = $6,
                target_solar_offset = $7,
                annual_production = $8,
                utility_id = $9,
                tariff_id = $10,
                external_id = $11,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(lead.id)
            .bind(lead.latitude)
            .bind(lead.longitude)
            .bind(lead.system_size)
            .bind(lead.panel_count)
            .bind(lead.kwh_usage)
            .bind(lead.target_solar_offset)
            .bind(lead.annual_production)
            .bind(lead.utility_id)
            .bind(lead.tariff_id)
            .bind(lead.external_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("updating lead {}", lead.id))?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead.id)))
    }

    async fn delete_lead(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead {} not found", id)));
        }
        Ok(())
    }

    async fn find_lead_by_idempotency_key(&self, key: &str) -> Result<Option<Lead>, AppError> {
        let sql = format!(
            "SELECT {} FROM leads WHERE idempotency_key = $1 LIMIT 1",
            LEAD_COLUMNS
        );
        sqlx::query_as::<_, Lead>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)
    }
}

#[derive(Clone)]
pub struct PgHouseRepo {
    pool: PgPool,
}

impl PgHouseRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HouseStore for PgHouseRepo {
    async fn create_house(&self, house: NewHouse) -> Result<House, AppError> {
        crate::models::validate_coordinates(house.lat, house.lng)?;

        let sql = format!(
            "INSERT INTO houses (lat, lng, state) VALUES ($1, $2, $3) RETURNING {}",
            HOUSE_COLUMNS
        );
        sqlx::query_as::<_, House>(&sql)
            .bind(house.lat)
            .bind(house.lng)
            .bind(&house.state)
            .fetch_one(&self.pool)
            .await
            .context("inserting house")
    }

    async fn get_house(&self, id: i64) -> Result<House, AppError> {
        let sql = format!("SELECT {} FROM houses WHERE id = $1", HOUSE_COLUMNS);
        sqlx::query_as::<_, House>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?
            .ok_or_else(|| AppError::NotFound(format!("House {} not found", id)))
    }

    async fn delete_house(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM houses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("House {} not found", id)));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn project_exists(&self, id: i64) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM projects WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;
        Ok(exists)
    }

    async fn user_exists(&self, id: i64) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(exists)
    }

    async fn get_user(&self, id: i64) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, phone_number,
                   street, city, state, postal_code, country
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }
}
