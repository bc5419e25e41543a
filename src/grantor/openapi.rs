use utoipa::{
    OpenApi,
    openapi::{Contact, InfoBuilder, License},
};

use super::{
    error::ErrorResponse,
    handlers::{authenticate, authorize, health, identicate, token},
    types::{AuthenticateForm, AuthorizeForm, NextStep, TokenRequest, TokenResponse},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        authorize::authorize,
        authorize::decide,
        authenticate::login_form,
        authenticate::authenticate,
        identicate::identicate,
        token::token,
        token::token_query,
    ),
    components(schemas(
        ErrorResponse,
        NextStep,
        AuthorizeForm,
        AuthenticateForm,
        TokenRequest,
        TokenResponse,
        health::Health,
    )),
    tags(
        (name = "oauth2", description = "Authorization code flow and token issuance"),
        (name = "health", description = "Liveness and build information")
    )
)]
struct ApiDoc;

/// The `OpenAPI` document for every route served by [`super::router`].
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();
    doc
}

fn cargo_info() -> utoipa::openapi::Info {
    // Cargo.toml metadata instead of utoipa's crate defaults
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });
    info
}

fn cargo_contact() -> Option<Contact> {
    // "Name <email>", only the first of `:` separated authors
    let primary = env!("CARGO_PKG_AUTHORS").split(':').next().map(str::trim)?;
    let (name, email) = match primary.find('<') {
        Some(start) => (
            optional_str(&primary[..start]),
            optional_str(primary[start + 1..].trim_end_matches('>')),
        ),
        None => (optional_str(primary), None),
    };
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
