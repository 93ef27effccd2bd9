// Sign-up form validation
// This module scores passwords, validates email addresses and phone numbers
// submitted by the sign-up and sign-in forms.

mod email;
mod phone;
mod validation;

pub use email::{suggest_domain, validate_email, EmailValidation};
pub use phone::{format_phone_digits, validate_phone_number, PhoneValidation};
pub use validation::{validate_password, PasswordRequirement, PasswordStrength, PasswordValidation};
