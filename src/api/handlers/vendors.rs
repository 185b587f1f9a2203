//! Vendor onboarding endpoints.
//!
//! Registration is a multipart form: the profile fields as text parts plus
//! exactly one `trade_license` file. Verification is admin only.

use super::{Envelope, principal::require_admin, respond};
use crate::{
    blob::Upload,
    core::Core,
    error::{CoreError, CoreResult},
    onboarding::VendorRegistration,
};
use axum::{
    Json,
    extract::{Extension, Multipart, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

pub const TRADE_LICENSE_FIELD: &str = "trade_license";

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyVendorRequest {
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VendorCreated {
    pub user_id: Uuid,
    pub vendor_id: Uuid,
}

/// Text fields and the single licence file of a registration form.
#[derive(Debug, Default)]
pub struct VendorForm {
    fields: HashMap<String, String>,
    trade_license: Option<Upload>,
}

impl VendorForm {
    fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Split the form into the registration and its upload.
    ///
    /// # Errors
    /// `Validation` when the licence file is missing.
    pub fn into_parts(self) -> CoreResult<(VendorRegistration, Upload)> {
        let registration = VendorRegistration {
            name: self.text("name"),
            email: self.text("email"),
            phone_number: self.text("phone_number"),
            company_name: self.text("company_name"),
            designation: self.text("designation"),
            tax_ref_number: self
                .fields
                .get("tax_ref_number")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            company_address: self.text("company_address"),
            state: self.text("state"),
        };
        let upload = self
            .trade_license
            .ok_or_else(|| CoreError::validation("trade_license file is required"))?;
        Ok((registration, upload))
    }
}

async fn read_form(mut multipart: Multipart) -> CoreResult<VendorForm> {
    let mut form = VendorForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| CoreError::validation(format!("Invalid multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == TRADE_LICENSE_FIELD {
            if form.trade_license.is_some() {
                return Err(CoreError::validation("Only one trade_license file is allowed"));
            }
            let filename = field.file_name().unwrap_or("trade_license").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| CoreError::validation(format!("Invalid trade_license: {err}")))?;
            if bytes.is_empty() {
                return Err(CoreError::validation("trade_license file is empty"));
            }
            form.trade_license = Some(Upload {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|err| CoreError::validation(format!("Invalid field {name}: {err}")))?;
            debug!(field = name.as_str(), "vendor form field");
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

#[utoipa::path(
    post,
    path = "/v1/vendors",
    request_body(content_type = "multipart/form-data", description = "Vendor profile fields and one trade_license file"),
    responses(
        (status = 201, description = "Vendor registered, pending verification.", body = Envelope),
        (status = 400, description = "Missing or invalid fields, or email already registered.", body = Envelope),
        (status = 500, description = "Upload or storage failure.", body = Envelope),
    ),
    tag = "vendors"
)]
pub async fn register_vendor(core: Extension<Core>, multipart: Multipart) -> impl IntoResponse {
    let (registration, upload) = match read_form(multipart).await.and_then(VendorForm::into_parts)
    {
        Ok(parts) => parts,
        Err(err) => return err.into_response(),
    };
    match core.onboarding.register_vendor(registration, upload).await {
        Ok(created) => respond(
            StatusCode::CREATED,
            "Vendor registered",
            Some(VendorCreated {
                user_id: created.user_id,
                vendor_id: created.vendor_id,
            }),
        ),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/vendors/{vendor_id}/verify",
    params(("vendor_id" = Uuid, Path, description = "Vendor id")),
    request_body = VerifyVendorRequest,
    responses(
        (status = 200, description = "Vendor verified.", body = Envelope),
        (status = 401, description = "Missing or invalid access token.", body = Envelope),
        (status = 403, description = "Admin access required.", body = Envelope),
        (status = 404, description = "Unknown vendor.", body = Envelope),
    ),
    security(("bearer" = [])),
    tag = "vendors"
)]
pub async fn verify_vendor(
    Path(vendor_id): Path<Uuid>,
    headers: HeaderMap,
    core: Extension<Core>,
    Json(request): Json<VerifyVendorRequest>,
) -> impl IntoResponse {
    if let Err(err) = require_admin(&headers, &core.auth) {
        return err.into_response();
    }
    match core
        .onboarding
        .verify_vendor(vendor_id, &request.password)
        .await
    {
        Ok(()) => respond::<()>(StatusCode::OK, "Vendor verified", None),
        Err(err) => err.into_response(),
    }
}
