//! Auth request bodies and the checks run before they are sent

use crate::{Result, VoxError};
use base64::Engine;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"));

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_MOBILE_LEN: usize = 10;
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

fn invalid(msg: &str) -> VoxError {
    VoxError::ValidationError(msg.to_string())
}

fn check_email(email: &str) -> Result<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(invalid("Please enter a valid email address"))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(invalid("Please fill in all required fields"));
        }
        check_email(&self.email)
    }
}

/// Profile photo picked during sign-up
#[derive(Debug, Clone)]
pub struct ProfilePhoto {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ProfilePhoto {
    /// Encoded the way the service stores it: a `data:` URL
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub mobile: String,
    pub date_of_birth: String,
    pub gender: String,
    pub country: String,
    pub profile_photo: Option<ProfilePhoto>,
}

impl SignupForm {
    pub fn validate(&self) -> Result<()> {
        let required = [
            &self.name,
            &self.email,
            &self.password,
            &self.confirm_password,
            &self.mobile,
            &self.date_of_birth,
            &self.gender,
            &self.country,
        ];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(invalid("Please fill in all required fields"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(invalid("Password must be at least 6 characters long"));
        }
        if self.password != self.confirm_password {
            return Err(invalid("Please make sure your passwords match"));
        }
        check_email(&self.email)?;
        if self.mobile.chars().count() < MIN_MOBILE_LEN {
            return Err(invalid("Please enter a valid mobile number"));
        }
        if let Some(photo) = &self.profile_photo {
            if photo.bytes.len() > MAX_PHOTO_BYTES {
                return Err(invalid("Profile photo must be less than 5MB"));
            }
        }
        Ok(())
    }

    pub(crate) fn to_request(&self) -> SignupRequest {
        SignupRequest {
            email: self.email.clone(),
            password: self.password.clone(),
            confirm_password: self.confirm_password.clone(),
            name: self.name.clone(),
            mobile: self.mobile.clone(),
            date_of_birth: self.date_of_birth.clone(),
            gender: self.gender.clone(),
            country: self.country.clone(),
            profile_photo: self.profile_photo.as_ref().map(ProfilePhoto::to_data_url),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SignupRequest {
    email: String,
    password: String,
    confirm_password: String,
    name: String,
    mobile: String,
    date_of_birth: String,
    gender: String,
    country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_photo: Option<String>,
}
