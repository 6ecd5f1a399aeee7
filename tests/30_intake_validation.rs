//! Intake form validation, exercised directly against the pure validator.
//! Field errors use the wire (camelCase) names the form submits.

use anyhow::Result;

use dsr_api::config::DsrConfig;
use dsr_api::database::models::{DsrPriority, DsrRequestType};
use dsr_api::services::intake::{validate_intake, DsrIntake, RawIntake, UploadedDocument};
use dsr_api::validation::ValidationError;

fn test_config() -> DsrConfig {
    DsrConfig {
        max_upload_bytes: 5 * 1024 * 1024,
        allowed_upload_mime: vec![
            "application/pdf".to_string(),
            "image/jpeg".to_string(),
            "image/png".to_string(),
        ],
        export_link_ttl_days: 7,
        export_record_size_estimate: 512,
    }
}

fn valid_export() -> RawIntake {
    RawIntake {
        request_type: Some("export".to_string()),
        email: Some("jane@example.com".to_string()),
        confirm_email: Some("jane@example.com".to_string()),
        full_name: Some("Jane Doe".to_string()),
        description: None,
        data_types: Some(r#"["profile","policies"]"#.to_string()),
        urgency: Some("normal".to_string()),
        agree_to_terms: Some("true".to_string()),
        document: None,
    }
}

fn field_errors(err: ValidationError) -> std::collections::HashMap<String, String> {
    match err {
        ValidationError::Fields(map) => map,
        other => panic!("expected aggregated field errors, got {other:?}"),
    }
}

#[test]
fn valid_export_form_produces_typed_intake() -> Result<()> {
    let intake = validate_intake(&valid_export(), &test_config())?;

    assert_eq!(intake.request_type(), DsrRequestType::Export);
    assert_eq!(intake.subject().email, "jane@example.com");
    match &intake {
        DsrIntake::Export {
            data_types,
            priority,
            description,
            ..
        } => {
            assert_eq!(data_types, &["profile", "policies"]);
            assert_eq!(*priority, DsrPriority::Normal);
            assert!(description.is_none());
        }
        other => panic!("expected export intake, got {other:?}"),
    }

    let new_request = intake.to_new_request();
    assert_eq!(new_request.request_type, DsrRequestType::Export);
    assert_eq!(new_request.full_name, "Jane Doe");
    Ok(())
}

#[test]
fn terms_must_be_accepted() {
    let mut raw = valid_export();
    raw.agree_to_terms = Some("false".to_string());
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("agreeToTerms"));

    let mut raw = valid_export();
    raw.agree_to_terms = None;
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("agreeToTerms"));
}

#[test]
fn confirmation_email_must_match() {
    let mut raw = valid_export();
    raw.confirm_email = Some("other@example.com".to_string());
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("confirmEmail"));

    // Case differences are not a mismatch.
    let mut raw = valid_export();
    raw.confirm_email = Some("JANE@example.com".to_string());
    assert!(validate_intake(&raw, &test_config()).is_ok());
}

#[test]
fn deletion_requires_a_description() {
    let mut raw = valid_export();
    raw.request_type = Some("delete".to_string());
    raw.description = None;
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("description"));

    raw.description = Some("Please remove my account data".to_string());
    let intake = validate_intake(&raw, &test_config()).unwrap();
    assert_eq!(intake.request_type(), DsrRequestType::Delete);
}

#[test]
fn description_html_is_sanitized() {
    let mut raw = valid_export();
    raw.request_type = Some("rectify".to_string());
    raw.description = Some("<script>alert(1)</script>fix my address".to_string());

    let intake = validate_intake(&raw, &test_config()).unwrap();
    match intake {
        DsrIntake::Rectify { description, .. } => {
            assert!(!description.contains('<'));
            assert!(description.contains("fix my address"));
        }
        other => panic!("expected rectify intake, got {other:?}"),
    }
}

#[test]
fn multiple_problems_are_reported_together() {
    let raw = RawIntake {
        request_type: Some("export".to_string()),
        email: Some("not-an-email".to_string()),
        confirm_email: None,
        full_name: Some("J".to_string()),
        description: None,
        data_types: Some("[]".to_string()),
        urgency: None,
        agree_to_terms: None,
        document: None,
    };

    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    for field in ["email", "confirmEmail", "fullName", "dataTypes", "agreeToTerms"] {
        assert!(errors.contains_key(field), "missing error for {field}");
    }
}

#[test]
fn data_types_must_be_a_nonempty_json_array() {
    let mut raw = valid_export();
    raw.data_types = Some("profile,policies".to_string());
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("dataTypes"));

    let mut raw = valid_export();
    raw.data_types = None;
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("dataTypes"));
}

#[test]
fn upload_type_and_size_are_enforced() {
    let mut raw = valid_export();
    raw.document = Some(UploadedDocument {
        filename: "id.gif".to_string(),
        content_type: "image/gif".to_string(),
        size: 1024,
    });
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("verificationDocument"));

    let mut raw = valid_export();
    raw.document = Some(UploadedDocument {
        filename: "id.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        size: 6 * 1024 * 1024,
    });
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors["verificationDocument"].contains("5 MB"));

    let mut raw = valid_export();
    raw.document = Some(UploadedDocument {
        filename: "id.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        size: 1024,
    });
    assert!(validate_intake(&raw, &test_config()).is_ok());
}

#[test]
fn unknown_urgency_is_an_error_but_missing_defaults_to_normal() {
    let mut raw = valid_export();
    raw.urgency = Some("asap".to_string());
    let errors = field_errors(validate_intake(&raw, &test_config()).unwrap_err());
    assert!(errors.contains_key("urgency"));

    let mut raw = valid_export();
    raw.urgency = None;
    let intake = validate_intake(&raw, &test_config()).unwrap();
    match intake {
        DsrIntake::Export { priority, .. } => assert_eq!(priority, DsrPriority::Normal),
        other => panic!("expected export intake, got {other:?}"),
    }
}
