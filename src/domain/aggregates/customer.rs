//! Customer Aggregate

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::NationalId;

/// Customer record keyed by national id. Text fields other than the phone are stored upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub national_id: NationalId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl ContactDetails {
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_uppercase(),
            email: self.email.trim().to_uppercase(),
            phone: self.phone.trim().to_string(),
            address: self.address.trim().to_uppercase(),
        }
    }
}

impl Customer {
    pub fn register(national_id: NationalId, contact: ContactDetails) -> Self {
        let c = contact.normalized();
        Self { national_id, name: c.name, email: c.email, phone: c.phone, address: c.address }
    }

    pub fn update_contact(&mut self, contact: ContactDetails) {
        let c = contact.normalized();
        self.name = c.name;
        self.email = c.email;
        self.phone = c.phone;
        self.address = c.address;
    }
}
