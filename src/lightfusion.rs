use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Files the vendor generates for every 3D project.
pub const MESH_FILES: [&str; 4] = ["scene.jpg", "scene.obj", "scene.ply", "scene.mtl"];

// ============ Vendor payloads ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressDetails {
    pub street: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "postalCode")]
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeownerDetails {
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardwareDetails {
    pub panel_id: i64,
    pub inverter_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_quantity: Option<i32>,
}

/// Body of `POST /v1/lead/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Create3DProjectRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub address: AddressDetails,
    pub homeowner: HomeownerDetails,
    pub hardware: HardwareDetails,
    pub consumption: Vec<i32>,
    pub lse_id: i64,
    pub period: String,
    pub target_solar_offset: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Create3DProjectResponse {
    #[serde(default)]
    pub id: i64,
    /// Vendor-assigned lead id; zero means the vendor did not create one.
    #[serde(default)]
    pub lead_id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub annual_production: f64,
    #[serde(default)]
    pub system_size: f64,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub annual_savings: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PriceItem {
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PriceBreakdown {
    pub items: Vec<PriceItem>,
    pub base_price_per_watt: f64,
    pub total_price_per_watt: f64,
    pub total_price_per_watt_financed: f64,
    pub default_base_price: f64,
    pub minimum_base_price: f64,
    pub total_amount: f64,
    pub total_amount_without_dealer_fee: f64,
    pub total_fee: f64,
}

/// Adders, price breakdown and completion data of a vendor project.
///
/// The two secondary lookups are best-effort and stay `None` when they fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProjectStatus {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub panel: Option<serde_json::Value>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub inverter: Vec<serde_json::Value>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub adders: Vec<serde_json::Value>,
    #[serde(default)]
    pub price_breakdown: Option<PriceBreakdown>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub lead_completion: Option<serde_json::Value>,
}

/// Local paths and public URLs of a project's mesh assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MeshFiles {
    pub project_id: i64,
    pub jpg_path: String,
    pub obj_path: String,
    pub ply_path: String,
    pub mtl_path: String,
    pub jpg_url: String,
    pub obj_url: String,
    pub ply_url: String,
    pub mtl_url: String,
    pub downloaded: bool,
    pub errors: Vec<String>,
}

impl MeshFiles {
    fn record(&mut self, file: &str, path: String, url: String) {
        let (p, u) = match file {
            "scene.jpg" => (&mut self.jpg_path, &mut self.jpg_url),
            "scene.obj" => (&mut self.obj_path, &mut self.obj_url),
            "scene.ply" => (&mut self.ply_path, &mut self.ply_url),
            _ => (&mut self.mtl_path, &mut self.mtl_url),
        };
        *p = path;
        *u = url;
    }
}

// ============ Gateway seam ============

/// Access to the vendor's 3D-modeling projects.
#[async_trait]
pub trait ProjectGateway: Send + Sync {
    /// Creates a vendor project. The vendor deduplicates on `idempotency_key`.
    async fn create_project(
        &self,
        request: &Create3DProjectRequest,
        idempotency_key: &str,
    ) -> Result<Create3DProjectResponse, AppError>;

    async fn project_status(&self, project_id: i64, house_id: i64)
        -> Result<ProjectStatus, AppError>;

    /// Fetches the mesh assets of a project into local media storage.
    ///
    /// Cancelling `cancel` stops in-flight downloads.
    async fn project_files(
        &self,
        project_id: i64,
        cancel: CancellationToken,
    ) -> Result<MeshFiles, AppError>;
}

// ============ HTTP client ============

#[derive(Debug, Clone)]
struct Credentials {
    email: String,
    password: String,
}

pub struct LightFusionClient {
    client: reqwest::Client,
    base_url: String,
    asset_base_url: String,
    media_dir: PathBuf,
    credentials: Option<Credentials>,
    token: RwLock<Option<String>>,
}

impl LightFusionClient {
    pub fn new(
        base_url: String,
        asset_base_url: String,
        media_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create LightFusion client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            asset_base_url: asset_base_url.trim_end_matches('/').to_string(),
            media_dir: media_dir.into(),
            credentials: None,
            token: RwLock::new(None),
        })
    }

    /// Sets the account used to obtain a session token on first use.
    pub fn with_credentials(mut self, email: String, password: String) -> Self {
        self.credentials = Some(Credentials { email, password });
        self
    }

    /// Uses a pre-issued session token instead of logging in.
    pub fn with_token(self, token: String) -> Self {
        Self {
            token: RwLock::new(Some(token)),
            ..self
        }
    }

    /// Exchanges the configured credentials for a session token.
    pub async fn login(&self) -> Result<String, AppError> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            AppError::ExternalApiError("not authenticated with LightFusion API".to_string())
        })?;

        let url = format!("{}/v1/users/sessions", self.base_url);
        tracing::info!("Logging in to LightFusion at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "contact": creds.email,
                "password": creds.password,
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("LightFusion login failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "LightFusion login failed with status {}: {}",
                status, error_text
            )));
        }

        #[derive(Deserialize)]
        struct LoginResponse {
            #[serde(default)]
            token: String,
        }

        let body: LoginResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse LightFusion login response: {}", e))
        })?;

        if body.token.is_empty() {
            return Err(AppError::ExternalApiError(
                "LightFusion login returned no token".to_string(),
            ));
        }

        *self.token.write().await = Some(body.token.clone());
        Ok(body.token)
    }

    async fn bearer(&self) -> Result<String, AppError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, AppError> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("LightFusion request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "LightFusion {} returned {}: {}",
                path, status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse LightFusion {} response: {}", path, e))
        })
    }

    fn project_dir(&self, project_id: i64) -> PathBuf {
        self.media_dir.join(project_id.to_string())
    }
}

#[async_trait]
impl ProjectGateway for LightFusionClient {
    async fn create_project(
        &self,
        request: &Create3DProjectRequest,
        idempotency_key: &str,
    ) -> Result<Create3DProjectResponse, AppError> {
        let token = self.bearer().await?;
        let url = format!("{}/v1/lead/create", self.base_url);
        tracing::info!(
            latitude = request.latitude,
            longitude = request.longitude,
            "Creating 3D project in LightFusion"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header("Idempotency-Key", idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create 3D project: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "3D project creation failed {}: {}",
                status, error_text
            )));
        }

        let created: Create3DProjectResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse 3D project response: {}", e))
        })?;

        tracing::info!(vendor_lead_id = created.lead_id, "3D project created");
        Ok(created)
    }

    async fn project_status(
        &self,
        project_id: i64,
        house_id: i64,
    ) -> Result<ProjectStatus, AppError> {
        let mut status: ProjectStatus = self
            .post_json(
                "/v3/adders.ListProjectAdders",
                &json!({ "project_id": project_id }),
            )
            .await?;

        match self
            .post_json::<PriceBreakdown>(
                "/v3/adders.GetPriceBreakdown",
                &json!({ "project_id": project_id, "house_id": house_id }),
            )
            .await
        {
            Ok(breakdown) => status.price_breakdown = Some(breakdown),
            Err(e) => tracing::warn!(project_id, "Price breakdown unavailable: {}", e),
        }

        let completion_path = format!("/v1/leads/{}/complete", house_id);
        match self
            .post_json::<serde_json::Value>(&completion_path, &json!({}))
            .await
        {
            Ok(completion) => status.lead_completion = Some(completion),
            Err(e) => tracing::warn!(house_id, "Lead completion unavailable: {}", e),
        }

        Ok(status)
    }

    async fn project_files(
        &self,
        project_id: i64,
        cancel: CancellationToken,
    ) -> Result<MeshFiles, AppError> {
        let project_dir = self.project_dir(project_id);
        tokio::fs::create_dir_all(&project_dir).await?;

        let mut tasks = JoinSet::new();
        for file in MESH_FILES {
            let client = self.client.clone();
            let remote = format!("{}/{}/mesh/{}", self.asset_base_url, project_id, file);
            let local = project_dir.join(file);
            let partial = partial_path(&local);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tokio::fs::remove_file(&partial).await;
                        Err("download cancelled".to_string())
                    }
                    result = fetch_asset(&client, &remote, &local, &partial) => result,
                };
                (file, local, outcome)
            });
        }

        let mut files = MeshFiles {
            project_id,
            ..Default::default()
        };
        let mut fetched = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((file, local, Ok(()))) => {
                    fetched += 1;
                    let url = format!("/media/{}/{}", project_id, file);
                    files.record(file, local.display().to_string(), url);
                }
                Ok((file, _, Err(e))) => {
                    files.errors.push(format!("{}: {}", file, e));
                }
                Err(e) => files.errors.push(format!("download task failed: {}", e)),
            }
        }
        files.errors.sort();

        if fetched == 0 {
            return Err(AppError::ExternalApiError(format!(
                "no mesh files retrieved for project {}: {}",
                project_id,
                files.errors.join("; ")
            )));
        }

        files.downloaded = true;
        tracing::info!(
            project_id,
            fetched,
            failed = files.errors.len(),
            "Mesh files retrieved"
        );
        Ok(files)
    }
}

/// Temporary download target next to `local`, unique per attempt.
fn partial_path(local: &Path) -> PathBuf {
    let mut name = local.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.part", Uuid::new_v4().simple()));
    local.with_file_name(name)
}

/// Downloads one asset unless it already exists locally.
///
/// The body is streamed into `partial` and renamed over `local` once complete.
async fn fetch_asset(
    client: &reqwest::Client,
    remote: &str,
    local: &Path,
    partial: &Path,
) -> Result<(), String> {
    if tokio::fs::try_exists(local).await.unwrap_or(false) {
        tracing::debug!("Mesh file already present: {}", local.display());
        return Ok(());
    }

    let response = client
        .get(remote)
        .send()
        .await
        .map_err(|e| format!("request failed: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }

    if let Err(e) = stream_to_file(response, partial).await {
        let _ = tokio::fs::remove_file(partial).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(partial, local).await {
        let _ = tokio::fs::remove_file(partial).await;
        return Err(format!("failed to store file: {}", e));
    }
    Ok(())
}

async fn stream_to_file(mut response: reqwest::Response, target: &Path) -> Result<(), String> {
    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| format!("failed to write file: {}", e))?;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| format!("failed to read body: {}", e))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("failed to write file: {}", e))?;
    }
    file.flush()
        .await
        .map_err(|e| format!("failed to write file: {}", e))
}
