use anyhow::{Context, Result};
use log::debug;

use crate::cli::utils::{print_error, print_info, print_json, print_list, print_success, read_password};
use crate::security::AuthSecurityManager;

/// Score a password, prompting for it when not given on the command line
pub fn check_password(manager: &AuthSecurityManager, password: Option<&str>, json: bool) -> Result<bool> {
    let password = match password {
        Some(p) => p.to_string(),
        None => read_password("Password: ").context("Failed to read password")?,
    };

    let result = manager.validate_password(&password);
    debug!("Password scored {} ({})", result.score, result.strength);

    if json {
        print_json(&result)?;
    } else {
        if result.is_valid {
            print_success(&format!("Password accepted (strength: {})", result.strength));
        } else {
            print_error(&format!("Password rejected (strength: {})", result.strength));
        }
        print_list("Errors", &result.errors);
        print_list("Suggestions", &result.suggestions);
    }

    Ok(result.is_valid)
}

pub fn check_email(manager: &AuthSecurityManager, email: &str, json: bool) -> Result<bool> {
    let result = manager.validate_email(email);

    if json {
        print_json(&result)?;
    } else {
        if result.is_valid {
            print_success(&format!("{} is a valid email address", email));
        } else {
            print_error(&format!("{} is not a valid email address", email));
        }
        print_list("Errors", &result.errors);
        print_list("Suggestions", &result.suggestions);
    }

    Ok(result.is_valid)
}

pub fn check_phone(manager: &AuthSecurityManager, phone: &str, json: bool) -> Result<bool> {
    let result = manager.validate_phone_number(phone);

    if json {
        print_json(&result)?;
    } else if result.is_valid {
        print_success(&format!("Valid phone number: {}", result.formatted));
    } else {
        print_error(&format!("Invalid phone number: {}", phone));
        print_list("Errors", &result.errors);
    }

    Ok(result.is_valid)
}

pub fn sanitize(manager: &AuthSecurityManager, text: &str, json: bool) -> Result<()> {
    let sanitized = manager.sanitize_input(text);

    if json {
        print_json(&serde_json::json!({ "sanitized": sanitized }))?;
    } else {
        if sanitized != text {
            print_info("Input was modified");
        }
        println!("{}", sanitized);
    }

    Ok(())
}
