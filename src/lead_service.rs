//! Lead intake and enrichment.
//!
//! Creation runs in a fixed order:
//! 1. Validate coordinates and referenced project/user.
//! 2. Replay check on the per-user idempotency key.
//! 3. Create the vendor 3D project (fatal on failure).
//! 4. Persist House then Lead, deleting the House if the Lead write fails.
//! 5. Best-effort tariff enrichment.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::genability::{TariffLookup, TariffSite};
use crate::lightfusion::{
    AddressDetails, Create3DProjectRequest, HardwareDetails, HomeownerDetails, MeshFiles,
    ProjectGateway, ProjectStatus,
};
use crate::models::{
    validate_coordinates, CreateLeadRequest, CreateLeadResponse, Lead, LeadFilter, LeadPage,
    LeadPatch, NewHouse, NewLead, User, DEFAULT_CONSUMPTION_PERIOD, DEFAULT_CONSUMPTION_UNIT,
};
use crate::repo::{Directory, HouseStore, LeadStore};

/// Chooses the panel/inverter sent with a new vendor project.
pub trait HardwareSelector: Send + Sync {
    fn select(&self, request: &CreateLeadRequest) -> HardwareDetails;
}

/// Always returns the configured default hardware.
#[derive(Debug, Clone, Copy)]
pub struct FixedHardwareSelector {
    pub panel_id: i64,
    pub inverter_id: i64,
}

impl HardwareSelector for FixedHardwareSelector {
    fn select(&self, _request: &CreateLeadRequest) -> HardwareDetails {
        HardwareDetails {
            panel_id: self.panel_id,
            inverter_id: self.inverter_id,
            storage_id: None,
            storage_quantity: None,
        }
    }
}

/// Scopes a client-supplied key to one user; absent a key every attempt is unique.
pub fn scoped_idempotency_key(user_id: i64, client_key: Option<&str>) -> String {
    match client_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => {
            let mut hasher = Sha256::new();
            hasher.update(format!("{}:{}", user_id, key).as_bytes());
            hex::encode(hasher.finalize())
        }
        None => Uuid::new_v4().to_string(),
    }
}

fn project_payload(
    request: &CreateLeadRequest,
    user: &User,
    hardware: HardwareDetails,
) -> Create3DProjectRequest {
    Create3DProjectRequest {
        latitude: request.latitude,
        longitude: request.longitude,
        address: AddressDetails {
            street: user.street.clone(),
            city: user.city.clone(),
            state: user.state.clone(),
            postal_code: user.postal_code.clone(),
            country: user.country.clone(),
        },
        homeowner: HomeownerDetails {
            email: user.email.clone(),
            firstname: user.first_name.clone(),
            lastname: user.last_name.clone(),
            phone: user.phone_number.clone(),
        },
        hardware,
        consumption: request.consumption.clone(),
        lse_id: request.lse_id.unwrap_or_default(),
        period: request
            .period
            .clone()
            .unwrap_or_else(|| DEFAULT_CONSUMPTION_PERIOD.to_string()),
        target_solar_offset: request.target_solar_offset,
        mode: request.mode.clone(),
        unit: request
            .unit
            .clone()
            .unwrap_or_else(|| DEFAULT_CONSUMPTION_UNIT.to_string()),
    }
}

pub struct LeadService {
    leads: Arc<dyn LeadStore>,
    houses: Arc<dyn HouseStore>,
    directory: Arc<dyn Directory>,
    gateway: Arc<dyn ProjectGateway>,
    tariffs: Arc<dyn TariffLookup>,
    hardware: Arc<dyn HardwareSelector>,
}

impl LeadService {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        houses: Arc<dyn HouseStore>,
        directory: Arc<dyn Directory>,
        gateway: Arc<dyn ProjectGateway>,
        tariffs: Arc<dyn TariffLookup>,
        hardware: Arc<dyn HardwareSelector>,
    ) -> Self {
        Self {
            leads,
            houses,
            directory,
            gateway,
            tariffs,
            hardware,
        }
    }

    pub async fn create_lead(
        &self,
        request: CreateLeadRequest,
        user_id: i64,
        project_id: i64,
        client_key: Option<&str>,
    ) -> Result<CreateLeadResponse, AppError> {
        validate_coordinates(request.latitude, request.longitude)?;

        if !self.directory.project_exists(project_id).await? {
            return Err(AppError::NotFound(format!("Project {} not found", project_id)));
        }
        if !self.directory.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        let idempotency_key = scoped_idempotency_key(user_id, client_key);
        if client_key.is_some() {
            if let Some(existing) = self
                .leads
                .find_lead_by_idempotency_key(&idempotency_key)
                .await?
            {
                // Every lead written by the saga carries its house.
                let house_id = existing.house_id.ok_or_else(|| {
                    AppError::Conflict(format!(
                        "idempotency key belongs to lead {} which has no house",
                        existing.id
                    ))
                })?;
                tracing::info!(lead_id = existing.id, "Replayed lead creation request");
                return Ok(CreateLeadResponse {
                    success: true,
                    lead_id: existing.id,
                    house_id,
                });
            }
        }

        let user = self.directory.get_user(user_id).await?;
        let hardware = self.hardware.select(&request);
        let payload = project_payload(&request, &user, hardware);

        let project = self
            .gateway
            .create_project(&payload, &idempotency_key)
            .await
            .context("failed to create 3D project")?;
        if project.lead_id == 0 {
            return Err(AppError::ExternalApiError(
                "3D project response is missing the vendor lead id".to_string(),
            ));
        }

        let new_lead = NewLead {
            project_id,
            user_id: Some(user_id),
            house_id: None,
            latitude: request.latitude,
            longitude: request.longitude,
            system_size: request.system_size,
            panel_count: request.panel_count,
            hardware_type: request.hardware_type.clone(),
            kwh_usage: request.kwh_usage,
            panel_id: Some(hardware.panel_id),
            inverter_id: Some(hardware.inverter_id),
            consumption: request.consumption.clone(),
            period: payload.period.clone(),
            target_solar_offset: request.target_solar_offset,
            mode: request.mode.clone(),
            unit: payload.unit.clone(),
            annual_production: project.annual_production,
            external_id: Some(project.lead_id),
            idempotency_key: Some(idempotency_key),
        };
        let mut lead = self.persist_lead_with_house(new_lead).await?;
        let house_id = lead.house_id.unwrap_or_default();

        self.enrich_tariff(&mut lead, &user).await;

        tracing::info!(
            lead_id = lead.id,
            house_id,
            vendor_lead_id = project.lead_id,
            "Lead created"
        );
        Ok(CreateLeadResponse {
            success: true,
            lead_id: lead.id,
            house_id,
        })
    }

    /// Writes the House, then the Lead pointing at it. A failed Lead write
    /// deletes the House again.
    async fn persist_lead_with_house(&self, mut new_lead: NewLead) -> Result<Lead, AppError> {
        let house = self
            .houses
            .create_house(NewHouse::pending(new_lead.latitude, new_lead.longitude))
            .await
            .context("failed to create house")?;
        new_lead.house_id = Some(house.id);

        let lead_error = match self.leads.create_lead(new_lead).await {
            Ok(lead) => return Ok(lead),
            Err(e) => e,
        };

        match self.houses.delete_house(house.id).await {
            Ok(()) => {
                tracing::warn!(house_id = house.id, "Lead write failed, house removed: {}", lead_error);
                Err(lead_error)
            }
            Err(cleanup_error) => {
                tracing::error!(
                    house_id = house.id,
                    inconsistency = true,
                    "Lead write failed and house cleanup failed: {} / {}",
                    lead_error,
                    cleanup_error
                );
                Err(AppError::PartialPersistence(format!(
                    "house {} left without a lead: {}",
                    house.id, lead_error
                )))
            }
        }
    }

    /// Attaches utility/tariff ids. Failures are logged and leave the lead as is.
    async fn enrich_tariff(&self, lead: &mut Lead, user: &User) {
        let site = TariffSite {
            address: user.street.clone(),
            latitude: lead.latitude,
            longitude: lead.longitude,
        };

        let matched = match self.tariffs.lookup(&site).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                tracing::debug!(lead_id = lead.id, "No tariff resolved");
                return;
            }
            Err(e) => {
                tracing::warn!(lead_id = lead.id, "Tariff lookup failed: {}", e);
                return;
            }
        };

        let mut enriched = lead.clone();
        enriched.utility_id = Some(matched.utility_id);
        enriched.tariff_id = Some(matched.tariff_id);
        match self.leads.update_lead(&enriched).await {
            Ok(updated) => *lead = updated,
            Err(e) => tracing::warn!(lead_id = lead.id, "Failed to store tariff enrichment: {}", e),
        }
    }

    pub async fn get_lead(&self, id: i64) -> Result<Lead, AppError> {
        self.leads.get_lead(id).await
    }

    pub async fn list_leads(&self, filter: LeadFilter) -> Result<LeadPage, AppError> {
        let (leads, total) = self.leads.list_leads(filter).await?;
        Ok(LeadPage {
            leads,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub async fn update_lead(&self, id: i64, patch: LeadPatch) -> Result<Lead, AppError> {
        if patch.is_empty() {
            return Err(AppError::BadRequest("no fields to update".to_string()));
        }
        let mut lead = self.leads.get_lead(id).await?;
        patch.apply(&mut lead);
        self.leads.update_lead(&lead).await
    }

    pub async fn delete_lead(&self, id: i64) -> Result<(), AppError> {
        self.leads.delete_lead(id).await
    }

    fn vendor_project_id(lead: &Lead) -> Result<i64, AppError> {
        lead.external_id
            .filter(|id| *id != 0)
            .ok_or_else(|| AppError::NotFound(format!("Lead {} has no vendor project", lead.id)))
    }

    /// Mesh assets of a vendor project.
    pub async fn mesh_files(
        &self,
        external_id: i64,
        cancel: CancellationToken,
    ) -> Result<MeshFiles, AppError> {
        self.gateway
            .project_files(external_id, cancel)
            .await
            .context("failed to get mesh files")
    }

    pub async fn mesh_files_for_lead(
        &self,
        lead_id: i64,
        cancel: CancellationToken,
    ) -> Result<MeshFiles, AppError> {
        let lead = self.leads.get_lead(lead_id).await?;
        self.mesh_files(Self::vendor_project_id(&lead)?, cancel).await
    }

    /// Vendor adders, price breakdown and completion for a lead.
    pub async fn project_status_for_lead(
        &self,
        lead_id: i64,
        house_id: Option<i64>,
    ) -> Result<ProjectStatus, AppError> {
        let lead = self.leads.get_lead(lead_id).await?;
        let project_id = Self::vendor_project_id(&lead)?;
        self.gateway
            .project_status(project_id, house_id.unwrap_or(project_id))
            .await
            .context("failed to get project status")
    }
}
