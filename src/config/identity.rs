//! Identity for the command-line runner

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::foundation::{Identity, UserId};

/// Optional signed-in identity
///
/// Both fields set means signed in; both unset means signed out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    pub user_id: Option<String>,
    pub access_token: Option<Secret<String>>,
}

impl IdentityConfig {
    /// Builds the identity, if one is configured.
    pub fn identity(&self) -> Result<Option<Identity>, ValidationError> {
        match (&self.user_id, &self.access_token) {
            (None, None) => Ok(None),
            (Some(user_id), Some(token)) => {
                let user_id = UserId::new(user_id.as_str()).map_err(|_| ValidationError::InvalidUserId)?;
                Ok(Some(Identity::new(user_id, token.expose_secret().as_str())))
            }
            _ => Err(ValidationError::IncompleteIdentity),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.identity().map(|_| ())
    }
}
