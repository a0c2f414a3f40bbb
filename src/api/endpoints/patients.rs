//! Patient identifier endpoints.
//!
//! - `POST   /api/v1/patient-identifiers`
//! - `GET    /api/v1/patient-identifiers[?facility_id=]`
//! - `GET    /api/v1/patient-identifiers/:code`
//! - `DELETE /api/v1/patient-identifiers/:code`

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::{get_patient_by_code, list_patients};
use crate::models::{Collection, Gender, PatientFilter, PatientIdentifier};
use crate::provisioning::{provision_patient, remove_patient, PatientInput};

#[derive(Debug, Deserialize)]
pub struct PatientCreate {
    pub patient_code: String,
    pub facility_id: Uuid,
    #[serde(default)]
    pub external_id: Option<String>,
    /// `"NN-MM"`, e.g. `"60-65"`.
    #[serde(default)]
    pub age_range: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

#[derive(Debug, Serialize)]
pub struct PatientCreated {
    #[serde(flatten)]
    pub patient: PatientIdentifier,
    pub collection: Collection,
}

#[derive(Debug, Deserialize)]
pub struct PatientListQuery {
    pub facility_id: Option<Uuid>,
}

/// 400 when the facility (or its VectorDB) does not exist or the code is taken.
pub async fn create(
    State(ctx): State<ApiContext>,
    payload: Result<Json<PatientCreate>, JsonRejection>,
) -> Result<Json<PatientCreated>, ApiError> {
    let Json(req) = payload?;
    let mut conn = ctx.core.open_db()?;

    let provisioned = provision_patient(
        &mut conn,
        &PatientInput {
            patient_code: req.patient_code,
            facility_id: req.facility_id,
            external_id: req.external_id,
            age_range: req.age_range,
            gender: req.gender,
        },
    )?;

    Ok(Json(PatientCreated {
        patient: provisioned.patient,
        collection: provisioned.collection,
    }))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<PatientListQuery>, QueryRejection>,
) -> Result<Json<Vec<PatientIdentifier>>, ApiError> {
    let Query(q) = query?;
    let conn = ctx.core.open_db()?;
    let patients = list_patients(&conn, &PatientFilter { facility_id: q.facility_id })?;
    Ok(Json(patients))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(code): Path<String>,
) -> Result<Json<PatientIdentifier>, ApiError> {
    let conn = ctx.core.open_db()?;
    get_patient_by_code(&conn, &code)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Patient identifier not found".into()))
}

/// Refused with 400 while documents reference the patient.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut conn = ctx.core.open_db()?;
    remove_patient(&mut conn, &code)?;
    Ok(StatusCode::NO_CONTENT)
}
