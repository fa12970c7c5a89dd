//! In-memory implementation of the record stores and directory.
//!
//! Used by the test suite and for running the service without Postgres.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::errors::AppError;
use crate::models::{House, Lead, LeadFilter, NewHouse, NewLead, Project, User};
use crate::repo::{Directory, HouseStore, LeadStore};

#[derive(Default)]
struct Tables {
    leads: BTreeMap<i64, Lead>,
    houses: BTreeMap<i64, House>,
    users: HashMap<i64, User>,
    projects: HashMap<i64, Project>,
    next_lead_id: i64,
    next_house_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> AppError {
    AppError::InternalError(format!("memory store lock poisoned: {}", e))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) -> Result<(), AppError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_project(&self, project: Project) -> Result<(), AppError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.projects.insert(project.id, project);
        Ok(())
    }

    pub fn lead_count(&self) -> usize {
        self.tables.read().map(|t| t.leads.len()).unwrap_or(0)
    }

    pub fn house_count(&self) -> usize {
        self.tables.read().map(|t| t.houses.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn create_lead(&self, lead: NewLead) -> Result<Lead, AppError> {
        lead.validate()?;

        let mut tables = self.tables.write().map_err(poisoned)?;
        if let Some(key) = lead.idempotency_key.as_deref() {
            if tables
                .leads
                .values()
                .any(|l| l.idempotency_key.as_deref() == Some(key))
            {
                return Err(AppError::Conflict(
                    "lead with this idempotency key already exists".to_string(),
                ));
            }
        }

        tables.next_lead_id += 1;
        let id = tables.next_lead_id;
        let created = lead.into_lead(id, Utc::now());
        tables.leads.insert(id, created.clone());
        Ok(created)
    }

    async fn get_lead(&self, id: i64) -> Result<Lead, AppError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .leads
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    async fn list_leads(&self, filter: LeadFilter) -> Result<(Vec<Lead>, i64), AppError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let matching: Vec<&Lead> = tables
            .leads
            .values()
            .rev()
            .filter(|l| filter.project_id.map_or(true, |p| l.project_id == p))
            .filter(|l| filter.user_id.map_or(true, |u| l.user_id == Some(u)))
            .collect();

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn update_lead(&self, lead: &Lead) -> Result<Lead, AppError> {
        lead.validate()?;

        let mut tables = self.tables.write().map_err(poisoned)?;
        let stored = tables
            .leads
            .get_mut(&lead.id)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", lead.id)))?;

        // Same column set as the Postgres update.
        stored.latitude = lead.latitude;
        stored.longitude = lead.longitude;
        stored.system_size = lead.system_size;
        stored.panel_count = lead.panel_count;
        stored.kwh_usage = lead.kwh_usage;
        stored.target_solar_offset = lead.target_solar_offset;
        stored.annual_production = lead.annual_production;
        stored.utility_id = lead.utility_id;
        stored.tariff_id = lead.tariff_id;
        stored.external_id = lead.external_id;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_lead(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables
            .leads
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    async fn find_lead_by_idempotency_key(&self, key: &str) -> Result<Option<Lead>, AppError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .leads
            .values()
            .find(|l| l.idempotency_key.as_deref() == Some(key))
            .cloned())
    }
}

#[async_trait]
impl HouseStore for MemoryStore {
    async fn create_house(&self, house: NewHouse) -> Result<House, AppError> {
        crate::models::validate_coordinates(house.lat, house.lng)?;

        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.next_house_id += 1;
        let id = tables.next_house_id;
        let created = house.into_house(id, Utc::now());
        tables.houses.insert(id, created.clone());
        Ok(created)
    }

    async fn get_house(&self, id: i64) -> Result<House, AppError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .houses
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("House {} not found", id)))
    }

    async fn delete_house(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables
            .houses
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("House {} not found", id)))
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn project_exists(&self, id: i64) -> Result<bool, AppError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.projects.contains_key(&id))
    }

    async fn user_exists(&self, id: i64) -> Result<bool, AppError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.users.contains_key(&id))
    }

    async fn get_user(&self, id: i64) -> Result<User, AppError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }
}
