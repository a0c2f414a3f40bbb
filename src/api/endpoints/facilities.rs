//! Facility endpoints.
//!
//! - `POST   /api/v1/facilities`
//! - `GET    /api/v1/facilities`
//! - `GET    /api/v1/facilities/:id`
//! - `GET    /api/v1/facilities/external/:external_id`
//! - `DELETE /api/v1/facilities/:id`

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::endpoints::find_facility;
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::db::repository::{get_facility_by_external_id, list_facilities};
use crate::models::{Collection, Facility, VectorDb};
use crate::provisioning::{provision_facility, remove_facility, FacilityInput};

#[derive(Debug, Deserialize)]
pub struct FacilityCreate {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// A new facility with the VectorDB and shared collection created alongside it.
#[derive(Debug, Serialize)]
pub struct FacilityCreated {
    #[serde(flatten)]
    pub facility: Facility,
    pub vector_db: VectorDb,
    pub shared_collection: Collection,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    payload: Result<Json<FacilityCreate>, JsonRejection>,
) -> Result<Json<FacilityCreated>, ApiError> {
    let Json(req) = payload?;
    let mut conn = ctx.core.open_db()?;

    let provisioned = provision_facility(
        &mut conn,
        &FacilityInput {
            name: req.name,
            address: req.address,
            external_id: req.external_id,
        },
    )?;

    Ok(Json(FacilityCreated {
        facility: provisioned.facility,
        vector_db: provisioned.vector_db,
        shared_collection: provisioned.shared_collection,
    }))
}

pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<Facility>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(list_facilities(&conn)?))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<Facility>, ApiError> {
    let id = parse_id(&id, "facility")?;
    let conn = ctx.core.open_db()?;
    Ok(Json(find_facility(&conn, &id)?))
}

pub async fn by_external_id(
    State(ctx): State<ApiContext>,
    Path(external_id): Path<String>,
) -> Result<Json<Facility>, ApiError> {
    let conn = ctx.core.open_db()?;
    get_facility_by_external_id(&conn, &external_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Facility not found".into()))
}

/// Refused with 400 while the facility still has patients or documents.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "facility")?;
    let mut conn = ctx.core.open_db()?;
    remove_facility(&mut conn, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
