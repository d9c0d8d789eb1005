use serde::{Deserialize, Serialize};

use stockledger_core::{CategoryId, DomainError, DomainResult, Entity};

use crate::NamedEntity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDetails {
    pub name: String,
    pub description: Option<String>,
}

impl CategoryDetails {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name", "cannot be empty"));
        }
        Ok(())
    }
}

/// Product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    id: CategoryId,
    name: String,
    description: Option<String>,
}

impl Category {
    pub fn create(id: CategoryId, details: CategoryDetails) -> DomainResult<Self> {
        details.validate()?;
        Ok(Self {
            id,
            name: details.name.trim().to_string(),
            description: details.description,
        })
    }

    pub fn id_typed(&self) -> CategoryId {
        self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn update(&mut self, details: CategoryDetails) -> DomainResult<()> {
        details.validate()?;
        self.name = details.name.trim().to_string();
        self.description = details.description;
        Ok(())
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl NamedEntity for Category {
    const KIND: &'static str = "category";

    fn name(&self) -> &str {
        &self.name
    }
}
