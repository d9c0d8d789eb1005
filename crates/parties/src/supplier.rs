use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, SupplierId};

use crate::NamedEntity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierDetails {
    pub name: String,
    /// Contact person.
    pub contact: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl SupplierDetails {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name", "cannot be empty"));
        }
        if self.contact.trim().is_empty() {
            return Err(DomainError::validation("contact", "cannot be empty"));
        }
        if let Some(email) = self.email.as_deref() {
            if !is_plausible_email(email) {
                return Err(DomainError::validation(
                    "email",
                    format!("'{email}' is not a valid email address"),
                ));
            }
        }
        Ok(())
    }
}

/// Single `@` with non-empty local and domain parts, no whitespace.
fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && !domain.contains('@')
}

/// Supplier of catalog products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    id: SupplierId,
    name: String,
    contact: String,
    phone: Option<String>,
    email: Option<String>,
}

impl Supplier {
    pub fn create(id: SupplierId, details: SupplierDetails) -> DomainResult<Self> {
        details.validate()?;
        let mut supplier = Self {
            id,
            name: String::new(),
            contact: String::new(),
            phone: None,
            email: None,
        };
        supplier.assign(details);
        Ok(supplier)
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn update(&mut self, details: SupplierDetails) -> DomainResult<()> {
        details.validate()?;
        self.assign(details);
        Ok(())
    }

    fn assign(&mut self, details: SupplierDetails) {
        self.name = details.name.trim().to_string();
        self.contact = details.contact.trim().to_string();
        self.phone = details.phone.filter(|p| !p.trim().is_empty());
        self.email = details.email.map(|e| e.trim().to_string());
    }
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl NamedEntity for Supplier {
    const KIND: &'static str = "supplier";

    fn name(&self) -> &str {
        &self.name
    }
}
