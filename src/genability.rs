use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as _;
use moka::future::Cache;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::circuit_breaker::{create_tariff_circuit_breaker, TariffCircuitBreaker};
use crate::errors::AppError;

/// Rows requested per page from the public tariff index.
pub const TARIFF_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountAddress {
    #[serde(rename = "addressString", skip_serializing_if = "String::is_empty", default)]
    pub address_string: String,
    #[serde(rename = "address1", skip_serializing_if = "String::is_empty", default)]
    pub street: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub city: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub state: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub country: String,
    #[serde(rename = "zip", skip_serializing_if = "String::is_empty", default)]
    pub postal_code: String,
    #[serde(rename = "lat", default)]
    pub latitude: f64,
    #[serde(rename = "lon", default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub address: AccountAddress,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tariff {
    pub tariff_id: i64,
    pub tariff_name: String,
    pub tariff_code: String,
    /// Load-serving entity (utility) id.
    pub lse_id: i64,
    pub lse_name: String,
    pub service_type: String,
    pub is_active: bool,
    pub master_tariff_id: i64,
    pub customer_likelihood: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Paged<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    count: usize,
}

/// First active tariff, else the first tariff in provider order.
pub fn pick_current_tariff(tariffs: &[Tariff]) -> Option<&Tariff> {
    tariffs.iter().find(|t| t.is_active).or_else(|| tariffs.first())
}

/// Site whose tariff should be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TariffSite {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TariffSite {
    fn cache_key(&self) -> String {
        format!(
            "account_{}_{:.6}_{:.6}",
            self.address.trim().to_lowercase(),
            self.latitude,
            self.longitude
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TariffMatch {
    pub utility_id: i64,
    pub tariff_id: i64,
}

/// Optional tariff enrichment capability.
///
/// `Ok(None)` means the capability is disabled or found nothing.
#[async_trait]
pub trait TariffLookup: Send + Sync {
    async fn lookup(&self, site: &TariffSite) -> Result<Option<TariffMatch>, AppError>;
}

/// Used when provider credentials are not configured.
pub struct DisabledTariffLookup;

#[async_trait]
impl TariffLookup for DisabledTariffLookup {
    async fn lookup(&self, _site: &TariffSite) -> Result<Option<TariffMatch>, AppError> {
        Ok(None)
    }
}

pub struct GenabilityClient {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    app_key: String,
    breaker: TariffCircuitBreaker,
    accounts: Cache<String, Account>,
    tariff_index: Cache<String, Vec<Tariff>>,
    tariffs: Cache<String, Tariff>,
}

impl GenabilityClient {
    pub fn new(
        base_url: &str,
        app_id: String,
        app_key: String,
        timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Genability client: {}", e))
            })?;

        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(Self {
            client,
            base_url,
            app_id,
            app_key,
            breaker: create_tariff_circuit_breaker(),
            accounts: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build(),
            tariff_index: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(cache_ttl)
                .build(),
            tariffs: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);

        let call = async {
            let mut builder = self
                .client
                .request(method, &url)
                .basic_auth(&self.app_id, Some(&self.app_key))
                .header("Accept", "application/json")
                .query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                AppError::ExternalApiError(format!("Genability request failed: {}", e))
            })?;

            if !response.status().is_success() {
                return Err(AppError::ExternalApiError(format!(
                    "Genability {} returned status {}",
                    path,
                    response.status()
                )));
            }

            response.json::<T>().await.map_err(|e| {
                AppError::ExternalApiError(format!("Failed to parse Genability response: {}", e))
            })
        };

        match self.breaker.call(call).await {
            Ok(value) => Ok(value),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "Genability circuit open, request rejected".to_string(),
            )),
        }
    }

    /// Creates (or reuses a cached) provider account for a site.
    pub async fn create_account(&self, site: &TariffSite) -> Result<Account, AppError> {
        let key = site.cache_key();
        if let Some(cached) = self.accounts.get(&key).await {
            return Ok(cached);
        }

        let input = Account {
            address: AccountAddress {
                address_string: site.address.clone(),
                latitude: site.latitude,
                longitude: site.longitude,
                ..Default::default()
            },
            ..Default::default()
        };
        let body = serde_json::to_value(&input)
            .map_err(|e| AppError::InternalError(format!("Failed to encode account: {}", e)))?;

        let page: Paged<Account> = self
            .request(Method::POST, "v1/accounts", &[], Some(&body))
            .await?;
        let account = page.results.into_iter().next().ok_or_else(|| {
            AppError::ExternalApiError("no account returned from Genability".to_string())
        })?;

        self.accounts.insert(key, account.clone()).await;
        Ok(account)
    }

    pub async fn show_account(&self, account_id: &str) -> Result<Account, AppError> {
        let page: Paged<Account> = self
            .request(Method::GET, &format!("v1/accounts/{}", account_id), &[], None)
            .await?;
        page.results
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("Genability account {} not found", account_id)))
    }

    /// Lists active residential tariffs for a postal code, all pages.
    pub async fn tariffs_for_zip(
        &self,
        zip_code: &str,
        country: &str,
    ) -> Result<Vec<Tariff>, AppError> {
        let key = format!("zip_{}_{}", zip_code, country);
        if let Some(cached) = self.tariff_index.get(&key).await {
            return Ok(cached);
        }

        let mut all = Vec::new();
        let mut page_start = 0usize;
        loop {
            let query = [
                ("zipCode", zip_code.to_string()),
                ("country", country.to_string()),
                ("isActive", "true".to_string()),
                ("customerClasses", "RESIDENTIAL".to_string()),
                ("pageCount", TARIFF_PAGE_SIZE.to_string()),
                ("pageStart", page_start.to_string()),
            ];
            let page: Paged<Tariff> = self
                .request(Method::GET, "public/tariffs", &query, None)
                .await?;

            all.extend(page.results);
            page_start += TARIFF_PAGE_SIZE;
            if page_start >= page.count {
                break;
            }
        }

        self.tariff_index.insert(key, all.clone()).await;
        Ok(all)
    }

    pub async fn show_tariff(&self, master_tariff_id: i64) -> Result<Tariff, AppError> {
        let key = format!("tariff_{}", master_tariff_id);
        if let Some(cached) = self.tariffs.get(&key).await {
            return Ok(cached);
        }

        let page: Paged<Tariff> = self
            .request(
                Method::GET,
                &format!("public/tariffs/{}", master_tariff_id),
                &[],
                None,
            )
            .await?;
        let tariff = page.results.into_iter().next().ok_or_else(|| {
            AppError::NotFound(format!("tariff {} not found", master_tariff_id))
        })?;

        self.tariffs.insert(key, tariff.clone()).await;
        Ok(tariff)
    }

    /// Current tariff of an account.
    pub async fn current_tariff(&self, account_id: &str) -> Result<Tariff, AppError> {
        let key = format!("account_tariff_{}", account_id);
        if let Some(cached) = self.tariffs.get(&key).await {
            return Ok(cached);
        }

        let page: Paged<Tariff> = self
            .request(
                Method::GET,
                &format!("v1/accounts/{}/tariffs", account_id),
                &[],
                None,
            )
            .await?;
        let tariff = pick_current_tariff(&page.results)
            .cloned()
            .ok_or_else(|| AppError::NotFound("no tariff found for account".to_string()))?;

        self.tariffs.insert(key, tariff.clone()).await;
        Ok(tariff)
    }
}

#[async_trait]
impl TariffLookup for GenabilityClient {
    async fn lookup(&self, site: &TariffSite) -> Result<Option<TariffMatch>, AppError> {
        let account = self.create_account(site).await?;
        let tariff = self.current_tariff(&account.account_id).await?;

        Ok(Some(TariffMatch {
            utility_id: tariff.lse_id,
            tariff_id: tariff.tariff_id,
        }))
    }
}
