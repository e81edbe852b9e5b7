use async_trait::async_trait;
use log::warn;

use crate::configuration::types::MachineCredential;
use crate::error_handling::types::AuthError;

/// An authenticated sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub machine_id: String,
}

/// Resolves a bearer token into the machine it was issued to.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Machine, AuthError>;
}

/// Extracts the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header =
        header.ok_or_else(|| AuthError::Unauthorized("missing authorization header".into()))?;
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AuthError::Unauthorized(
            "invalid authorization header".into(),
        )),
    }
}

/// Compares two strings without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Machines declared in the `[[machines]]` configuration section.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    machines: Vec<MachineCredential>,
}

impl StaticCredentials {
    pub fn new(machines: Vec<MachineCredential>) -> Self {
        Self { machines }
    }
}

#[async_trait]
impl CredentialValidator for StaticCredentials {
    async fn authenticate(&self, token: &str) -> Result<Machine, AuthError> {
        // every entry is compared so timing does not reveal the matching index
        let mut found: Option<&MachineCredential> = None;
        for machine in &self.machines {
            if constant_time_eq(&machine.token, token) && found.is_none() {
                found = Some(machine);
            }
        }

        match found {
            Some(machine) if machine.validated => Ok(Machine {
                machine_id: machine.machine_id.clone(),
            }),
            Some(machine) => {
                warn!("rejected unvalidated machine '{}'", machine.machine_id);
                Err(AuthError::Unauthorized(format!(
                    "machine '{}' is not validated",
                    machine.machine_id
                )))
            }
            None => Err(AuthError::Unauthorized("invalid token".into())),
        }
    }
}
