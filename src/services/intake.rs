use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DsrConfig;
use crate::database::models::{
    AuditAction, DsrPriority, DsrRequest, DsrRequestType, NewDsrRequest,
};
use crate::database::repository::DsrRepository;
use crate::error::ApiError;
use crate::security::VerificationTokenService;
use crate::services::audit::RequestContext;
use crate::services::mailer::Mailer;
use crate::validation::{
    sanitize_html, ArrayValidator, BooleanValidator, Pattern, StringValidator, Validate,
    ValidationError,
};

/// Raw multipart intake form, field names as they appear on the wire.
#[derive(Debug, Default)]
pub struct RawIntake {
    pub request_type: Option<String>,
    pub email: Option<String>,
    pub confirm_email: Option<String>,
    pub full_name: Option<String>,
    pub description: Option<String>,
    /// JSON array string, e.g. `["profile","policies"]`.
    pub data_types: Option<String>,
    pub urgency: Option<String>,
    pub agree_to_terms: Option<String>,
    pub document: Option<UploadedDocument>,
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub email: String,
    pub full_name: String,
}

/// Typed intake, discriminated by request type. Each variant carries only
/// the fields it actually requires.
#[derive(Debug, Clone, PartialEq)]
pub enum DsrIntake {
    Export {
        subject: SubjectIdentity,
        data_types: Vec<String>,
        description: Option<String>,
        priority: DsrPriority,
    },
    Delete {
        subject: SubjectIdentity,
        data_types: Vec<String>,
        description: String,
        priority: DsrPriority,
    },
    Rectify {
        subject: SubjectIdentity,
        data_types: Vec<String>,
        description: String,
        priority: DsrPriority,
    },
}

impl DsrIntake {
    pub fn request_type(&self) -> DsrRequestType {
        match self {
            DsrIntake::Export { .. } => DsrRequestType::Export,
            DsrIntake::Delete { .. } => DsrRequestType::Delete,
            DsrIntake::Rectify { .. } => DsrRequestType::Rectify,
        }
    }

    pub fn subject(&self) -> &SubjectIdentity {
        match self {
            DsrIntake::Export { subject, .. }
            | DsrIntake::Delete { subject, .. }
            | DsrIntake::Rectify { subject, .. } => subject,
        }
    }

    pub fn to_new_request(&self) -> NewDsrRequest {
        let (data_types, description, priority) = match self {
            DsrIntake::Export {
                data_types,
                description,
                priority,
                ..
            } => (data_types.clone(), description.clone(), *priority),
            DsrIntake::Delete {
                data_types,
                description,
                priority,
                ..
            }
            | DsrIntake::Rectify {
                data_types,
                description,
                priority,
                ..
            } => (data_types.clone(), Some(description.clone()), *priority),
        };

        NewDsrRequest {
            request_type: self.request_type(),
            email: self.subject().email.clone(),
            full_name: self.subject().full_name.clone(),
            priority,
            description,
            data_types,
        }
    }
}

/// Validate the raw form into a typed intake. All rules run before anything
/// is persisted; errors are aggregated per field using the wire field names.
pub fn validate_intake(raw: &RawIntake, cfg: &DsrConfig) -> Result<DsrIntake, ValidationError> {
    let mut errors: HashMap<String, String> = HashMap::new();

    let request_type = match raw.request_type.as_deref() {
        None | Some("") => {
            errors.insert("type".into(), "request type is required".into());
            None
        }
        Some(s) => match s.parse::<DsrRequestType>() {
            Ok(t) => Some(t),
            Err(e) => {
                errors.insert("type".into(), e);
                None
            }
        },
    };

    let email_validator = StringValidator::new().pattern(Pattern::Email).max_len(254);
    let email = match &raw.email {
        None => {
            errors.insert("email".into(), "email is required".into());
            None
        }
        Some(s) => match email_validator.validate(&json!(s)) {
            Ok(v) => Some(v),
            Err(e) => {
                errors.insert("email".into(), e.to_string());
                None
            }
        },
    };

    match (&email, &raw.confirm_email) {
        (_, None) => {
            errors.insert("confirmEmail".into(), "email confirmation is required".into());
        }
        (Some(email), Some(confirm)) if !email.eq_ignore_ascii_case(confirm.trim()) => {
            errors.insert("confirmEmail".into(), "email addresses do not match".into());
        }
        _ => {}
    }

    let full_name = match &raw.full_name {
        None => {
            errors.insert("fullName".into(), "full name is required".into());
            None
        }
        Some(s) => match StringValidator::new()
            .min_len(2)
            .max_len(200)
            .validate(&json!(s))
        {
            Ok(v) => Some(v),
            Err(e) => {
                errors.insert("fullName".into(), e.to_string());
                None
            }
        },
    };

    let data_types = match &raw.data_types {
        None => {
            errors.insert("dataTypes".into(), "select at least one data type".into());
            None
        }
        Some(s) => match serde_json::from_str::<Value>(s) {
            Err(_) => {
                errors.insert("dataTypes".into(), "must be a JSON array".into());
                None
            }
            Ok(value) => {
                let validator =
                    ArrayValidator::new(StringValidator::new().min_len(1).max_len(100))
                        .min_items(1)
                        .max_items(20);
                match validator.validate(&value) {
                    Ok(v) => Some(v),
                    Err(ValidationError::Invalid(m)) => {
                        errors.insert("dataTypes".into(), m);
                        None
                    }
                    Err(e) => {
                        errors.insert("dataTypes".into(), e.to_string());
                        None
                    }
                }
            }
        },
    };

    let description = raw
        .description
        .as_deref()
        .map(sanitize_html)
        .filter(|s| !s.trim().is_empty());
    if let Some(t) = request_type {
        if t.requires_description() && description.is_none() {
            errors.insert(
                "description".into(),
                format!("description is required for {t} requests"),
            );
        }
    }

    match raw.agree_to_terms.as_deref() {
        Some(s) => match BooleanValidator::new().validate(&json!(s)) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                errors.insert("agreeToTerms".into(), "you must agree to the terms".into());
            }
        },
        None => {
            errors.insert("agreeToTerms".into(), "you must agree to the terms".into());
        }
    }

    let priority = match raw.urgency.as_deref() {
        None | Some("") => DsrPriority::Normal,
        Some(s) => match s.parse::<DsrPriority>() {
            Ok(p) => p,
            Err(e) => {
                errors.insert("urgency".into(), e);
                DsrPriority::Normal
            }
        },
    };

    if let Some(doc) = &raw.document {
        if !cfg
            .allowed_upload_mime
            .iter()
            .any(|m| m == &doc.content_type)
        {
            errors.insert(
                "verificationDocument".into(),
                format!("unsupported file type: {}", doc.content_type),
            );
        } else if doc.size > cfg.max_upload_bytes {
            errors.insert(
                "verificationDocument".into(),
                format!(
                    "file exceeds the {} MB limit",
                    cfg.max_upload_bytes / (1024 * 1024)
                ),
            );
        }
    }

    if !errors.is_empty() {
        return Err(ValidationError::Fields(errors));
    }

    // All Options are Some once errors is empty.
    let subject = SubjectIdentity {
        email: email.unwrap_or_default(),
        full_name: full_name.unwrap_or_default(),
    };
    let data_types = data_types.unwrap_or_default();

    Ok(match request_type.unwrap_or(DsrRequestType::Export) {
        DsrRequestType::Export => DsrIntake::Export {
            subject,
            data_types,
            description,
            priority,
        },
        DsrRequestType::Delete => DsrIntake::Delete {
            subject,
            data_types,
            description: description.unwrap_or_default(),
            priority,
        },
        DsrRequestType::Rectify => DsrIntake::Rectify {
            subject,
            data_types,
            description: description.unwrap_or_default(),
            priority,
        },
    })
}

/// Validates, persists (status=pending), audits, and kicks off the email
/// verification flow. Nothing is persisted when validation fails.
pub struct IntakeService {
    repo: DsrRepository,
    tokens: VerificationTokenService,
    mailer: Arc<Mailer>,
}

impl IntakeService {
    pub fn new(repo: DsrRepository, tokens: VerificationTokenService, mailer: Arc<Mailer>) -> Self {
        Self {
            repo,
            tokens,
            mailer,
        }
    }

    pub async fn submit(
        &self,
        raw: &RawIntake,
        cfg: &DsrConfig,
        ctx: &RequestContext,
    ) -> Result<DsrRequest, ApiError> {
        let intake = validate_intake(raw, cfg)?;

        let request = self.repo.insert_request(&intake.to_new_request()).await?;

        self.repo
            .append_audit(
                request.id,
                AuditAction::RequestCreated,
                None,
                Some(json!({
                    "request_type": request.request_type,
                    "email": request.email,
                    "status": request.status,
                    "data_types": request.data_types,
                })),
                ctx.ip(),
                ctx.ua(),
            )
            .await?;

        let token = self.tokens.issue(request.id, &request.email)?;
        self.mailer
            .send_verification(&request.email, request.id, &token)
            .await;

        Ok(request)
    }
}
