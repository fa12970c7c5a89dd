#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use sunready_api::config::Config;
use sunready_api::errors::AppError;
use sunready_api::genability::{TariffLookup, TariffMatch, TariffSite};
use sunready_api::lead_service::{FixedHardwareSelector, LeadService};
use sunready_api::lightfusion::{
    Create3DProjectRequest, Create3DProjectResponse, MeshFiles, ProjectGateway, ProjectStatus,
};
use sunready_api::memory_store::MemoryStore;
use sunready_api::models::{
    CreateLeadRequest, House, Lead, LeadFilter, NewHouse, NewLead, Project, User,
};
use sunready_api::repo::{HouseStore, LeadStore};

pub const USER_ID: i64 = 1;
pub const PROJECT_ID: i64 = 10;

pub fn test_config(media_dir: &str) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 8080,
        lightfusion_base_url: "http://127.0.0.1:9".to_string(),
        lightfusion_asset_base_url: "http://127.0.0.1:9/leads".to_string(),
        lightfusion_email: None,
        lightfusion_password: None,
        genability_base_url: "http://127.0.0.1:9/rest/".to_string(),
        genability_app_id: None,
        genability_app_key: None,
        media_dir: media_dir.to_string(),
        default_panel_id: 156,
        default_inverter_id: 324,
        gateway_timeout_secs: 5,
        tariff_cache_ttl_secs: 3600,
    }
}

pub fn sample_user() -> User {
    User {
        id: USER_ID,
        first_name: "Ana".to_string(),
        last_name: "Lee".to_string(),
        email: "ana@example.com".to_string(),
        phone_number: "+15105550100".to_string(),
        street: "1 Main St".to_string(),
        city: "Oakland".to_string(),
        state: "CA".to_string(),
        postal_code: "94607".to_string(),
        country: "US".to_string(),
    }
}

/// Memory store with one user and one project.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.insert_user(sample_user()).unwrap();
    store
        .insert_project(Project {
            id: PROJECT_ID,
            user_id: Some(USER_ID),
            name: "Roof".to_string(),
            status: "draft".to_string(),
        })
        .unwrap();
    Arc::new(store)
}

pub fn lead_request(lat: f64, lng: f64) -> CreateLeadRequest {
    CreateLeadRequest {
        project_id: Some(PROJECT_ID),
        latitude: lat,
        longitude: lng,
        system_size: 10.5,
        panel_count: 30,
        kwh_usage: 12_000.0,
        consumption: vec![1000; 12],
        target_solar_offset: 90,
        ..Default::default()
    }
}

/// Gateway double answering every creation with a fixed result.
pub struct FakeGateway {
    result: Result<Create3DProjectResponse, String>,
    pub create_calls: AtomicUsize,
    pub keys: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn ok(vendor_lead_id: i64) -> Self {
        Self {
            result: Ok(Create3DProjectResponse {
                id: vendor_lead_id,
                lead_id: vendor_lead_id,
                status: "created".to_string(),
                annual_production: 14_000.5,
                ..Default::default()
            }),
            create_calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            create_calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProjectGateway for FakeGateway {
    async fn create_project(
        &self,
        _request: &Create3DProjectRequest,
        idempotency_key: &str,
    ) -> Result<Create3DProjectResponse, AppError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(idempotency_key.to_string());
        self.result
            .clone()
            .map_err(AppError::ExternalApiError)
    }

    async fn project_status(
        &self,
        _project_id: i64,
        _house_id: i64,
    ) -> Result<ProjectStatus, AppError> {
        Ok(ProjectStatus::default())
    }

    async fn project_files(
        &self,
        project_id: i64,
        _cancel: CancellationToken,
    ) -> Result<MeshFiles, AppError> {
        Ok(MeshFiles {
            project_id,
            downloaded: true,
            ..Default::default()
        })
    }
}

/// Gateway whose mesh downloads never finish; reports when their token is cancelled.
pub struct StallingMeshGateway {
    pub inner: FakeGateway,
    pub started: Arc<Notify>,
    pub cancelled: Arc<Notify>,
}

impl StallingMeshGateway {
    pub fn new(vendor_lead_id: i64) -> Self {
        Self {
            inner: FakeGateway::ok(vendor_lead_id),
            started: Arc::new(Notify::new()),
            cancelled: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl ProjectGateway for StallingMeshGateway {
    async fn create_project(
        &self,
        request: &Create3DProjectRequest,
        idempotency_key: &str,
    ) -> Result<Create3DProjectResponse, AppError> {
        self.inner.create_project(request, idempotency_key).await
    }

    async fn project_status(
        &self,
        project_id: i64,
        house_id: i64,
    ) -> Result<ProjectStatus, AppError> {
        self.inner.project_status(project_id, house_id).await
    }

    async fn project_files(
        &self,
        _project_id: i64,
        cancel: CancellationToken,
    ) -> Result<MeshFiles, AppError> {
        let cancelled = self.cancelled.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            cancelled.notify_one();
        });
        self.started.notify_one();
        std::future::pending().await
    }
}

pub struct FixedTariffs(pub TariffMatch);

#[async_trait]
impl TariffLookup for FixedTariffs {
    async fn lookup(&self, _site: &TariffSite) -> Result<Option<TariffMatch>, AppError> {
        Ok(Some(self.0))
    }
}

pub struct UnreachableTariffs;

#[async_trait]
impl TariffLookup for UnreachableTariffs {
    async fn lookup(&self, _site: &TariffSite) -> Result<Option<TariffMatch>, AppError> {
        Err(AppError::ExternalApiError(
            "Genability request failed: connection refused".to_string(),
        ))
    }
}

/// Lead store whose inserts always fail; everything else is delegated.
pub struct RejectingLeadStore(pub Arc<MemoryStore>);

#[async_trait]
impl LeadStore for RejectingLeadStore {
    async fn create_lead(&self, _lead: NewLead) -> Result<Lead, AppError> {
        Err(AppError::DatabaseError(sqlx::Error::Protocol(
            "connection reset".to_string(),
        )))
    }
    async fn get_lead(&self, id: i64) -> Result<Lead, AppError> {
        self.0.get_lead(id).await
    }
    async fn list_leads(&self, filter: LeadFilter) -> Result<(Vec<Lead>, i64), AppError> {
        self.0.list_leads(filter).await
    }
    async fn update_lead(&self, lead: &Lead) -> Result<Lead, AppError> {
        self.0.update_lead(lead).await
    }
    async fn delete_lead(&self, id: i64) -> Result<(), AppError> {
        self.0.delete_lead(id).await
    }
    async fn find_lead_by_idempotency_key(&self, key: &str) -> Result<Option<Lead>, AppError> {
        self.0.find_lead_by_idempotency_key(key).await
    }
}

/// House store whose deletes always fail.
pub struct StickyHouseStore(pub Arc<MemoryStore>);

#[async_trait]
impl HouseStore for StickyHouseStore {
    async fn create_house(&self, house: NewHouse) -> Result<House, AppError> {
        self.0.create_house(house).await
    }
    async fn get_house(&self, id: i64) -> Result<House, AppError> {
        self.0.get_house(id).await
    }
    async fn delete_house(&self, _id: i64) -> Result<(), AppError> {
        Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut))
    }
}

pub fn hardware() -> Arc<FixedHardwareSelector> {
    Arc::new(FixedHardwareSelector {
        panel_id: 156,
        inverter_id: 324,
    })
}

/// Lead service over a memory store with the given gateway and tariff lookup.
pub fn service_with(
    store: Arc<MemoryStore>,
    gateway: Arc<dyn ProjectGateway>,
    tariffs: Arc<dyn TariffLookup>,
) -> LeadService {
    LeadService::new(
        store.clone(),
        store.clone(),
        store,
        gateway,
        tariffs,
        hardware(),
    )
}
