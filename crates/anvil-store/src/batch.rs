//! Whole-batch validation shared by the store backends.

use std::collections::HashMap;

use anvil_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;

/// Validate a batch before any of it is written.
///
/// `existing` reads an object already in the store; `contains` checks for
/// one. Checks, in batch order:
/// 1. the declared id equals the digest of the object;
/// 2. an object already stored under that id has identical bytes;
/// 3. every reference resolves in the store or earlier in the batch.
///
/// Returns the indices of objects that still need to be written.
pub fn validate_batch<E, C>(
    objects: &[(ObjectId, StoredObject)],
    existing: E,
    contains: C,
) -> StoreResult<Vec<usize>>
where
    E: Fn(&ObjectId) -> StoreResult<Option<StoredObject>>,
    C: Fn(&ObjectId) -> StoreResult<bool>,
{
    let mut seen: HashMap<ObjectId, &StoredObject> = HashMap::with_capacity(objects.len());
    let mut to_write = Vec::new();

    for (index, (declared, object)) in objects.iter().enumerate() {
        let computed = object.compute_id();
        if computed != *declared {
            return Err(StoreError::DigestMismatch {
                declared: *declared,
                computed,
            });
        }

        if let Some(earlier) = seen.get(declared) {
            if *earlier != object {
                return Err(StoreError::IntegrityConflict { id: *declared });
            }
            continue;
        }

        let stored = existing(declared)?;
        match &stored {
            Some(current) if current != object => {
                return Err(StoreError::IntegrityConflict { id: *declared });
            }
            Some(_) => {}
            None => to_write.push(index),
        }

        for reference in object.references()? {
            if !seen.contains_key(&reference) && !contains(&reference)? {
                return Err(StoreError::MissingReference {
                    from: *declared,
                    missing: reference,
                });
            }
        }

        seen.insert(*declared, object);
    }

    debug!(
        objects = objects.len(),
        new = to_write.len(),
        "batch validated"
    );
    Ok(to_write)
}
