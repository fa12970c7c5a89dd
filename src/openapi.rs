use utoipa::OpenApi;

use crate::handlers;
use crate::lightfusion::{MeshFiles, PriceBreakdown, PriceItem, ProjectStatus};
use crate::models::{CreateLeadRequest, CreateLeadResponse, Lead, LeadPage, LeadPatch};
use crate::quote::{QuoteInput, QuoteResult};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::create_lead,
        handlers::list_leads,
        handlers::get_lead,
        handlers::update_lead,
        handlers::delete_lead,
        handlers::get_mesh_files,
        handlers::get_project_status,
        handlers::create_quote,
    ),
    components(schemas(
        CreateLeadRequest, CreateLeadResponse, Lead, LeadPage, LeadPatch,
        MeshFiles, ProjectStatus, PriceBreakdown, PriceItem,
        QuoteInput, QuoteResult
    )),
    tags(
        (name = "leads", description = "Lead intake and enrichment"),
        (name = "quote", description = "Solar quote calculation"),
        (name = "health", description = "Health endpoint")
    )
)]
pub struct ApiDoc;
