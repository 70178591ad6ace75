use realm_common::InstanceId;
use realm_kernel::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced synchronously by engine operations.
///
/// Absence of an entity is not an error here; operations report it as
/// `false`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),
}
