//! Shipping address value object.

use serde::{Deserialize, Serialize};

const MIN_PHONE_LEN: usize = 10;
const MAX_PHONE_LEN: usize = 20;

/// Where an order ships to. Frozen on the order once placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Trims every field, lower-cases the email and checks the field rules.
    ///
    /// All problems are reported at once.
    pub fn normalize(self) -> Result<Self, Vec<String>> {
        let address = Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            zip_code: self.zip_code.trim().to_string(),
            country: self.country.trim().to_string(),
        };

        let mut problems = Vec::new();
        for (field, value) in address.fields() {
            if value.is_empty() {
                problems.push(format!("shipping_address.{field} is required"));
            }
        }
        if !address.email.is_empty() && !is_plausible_email(&address.email) {
            problems.push("shipping_address.email must be a valid email address".to_string());
        }
        let phone_len = address.phone.chars().count();
        if !address.phone.is_empty() && !(MIN_PHONE_LEN..=MAX_PHONE_LEN).contains(&phone_len) {
            problems.push(format!(
                "shipping_address.phone must be between {MIN_PHONE_LEN} and {MAX_PHONE_LEN} characters"
            ));
        }

        if problems.is_empty() {
            Ok(address)
        } else {
            Err(problems)
        }
    }

    fn fields(&self) -> [(&'static str, &str); 9] {
        [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("zip_code", &self.zip_code),
            ("country", &self.country),
        ]
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}
