use realm_common::{CharacterId, EntityKey, EntityKind, InstanceId, NpcId, ObjectId};
use realm_kernel::{EntityStore, FieldMap, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Errors from a visibility query.
#[derive(Debug, thiserror::Error)]
pub enum VisibilityError {
    #[error("observer {0} not found")]
    ObserverNotFound(EntityKey),
    #[error("observer {0} is not in any instance")]
    NoInstance(EntityKey),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Visible entities grouped by kind, keyed by id, with their stored
/// attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Elements {
    pub characters: BTreeMap<u64, FieldMap>,
    pub npcs: BTreeMap<u64, FieldMap>,
    pub items: BTreeMap<u64, FieldMap>,
}

impl Elements {
    fn group_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<u64, FieldMap> {
        match kind {
            EntityKind::Character => &mut self.characters,
            EntityKind::Npc => &mut self.npcs,
            EntityKind::Object => &mut self.items,
        }
    }

    fn group(&self, kind: EntityKind) -> &BTreeMap<u64, FieldMap> {
        match kind {
            EntityKind::Character => &self.characters,
            EntityKind::Npc => &self.npcs,
            EntityKind::Object => &self.items,
        }
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.group(key.kind).contains_key(&key.id)
    }

    pub fn get(&self, key: EntityKey) -> Option<&FieldMap> {
        self.group(key.kind).get(&key.id)
    }

    pub fn len(&self) -> usize {
        self.characters.len() + self.npcs.len() + self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collaborator-facing answer to a visibility query.
///
/// `status` is false, and `elements` absent, when the observer has no
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleResponse {
    pub status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Elements>,
}

impl VisibleResponse {
    pub fn denied() -> Self {
        Self {
            status: false,
            elements: None,
        }
    }

    pub fn granted(elements: Elements) -> Self {
        Self {
            status: true,
            elements: Some(elements),
        }
    }
}

/// Filter `candidates` down to the ones sharing `observer`'s instance.
///
/// Duplicate candidates are collapsed. Cost: one read for the observer, one
/// batched instance-id read, one batched attribute read. A candidate that
/// vanishes or changes instance between the two batched reads is excluded.
pub async fn visible<S: EntityStore>(
    store: &S,
    observer: EntityKey,
    candidates: impl IntoIterator<Item = EntityKey>,
) -> Result<Elements, VisibilityError> {
    let home = observer_instance(store, observer).await?;
    let candidates: Vec<EntityKey> = candidates.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    if candidates.is_empty() {
        return Ok(Elements::default());
    }

    let instances = store.instance_ids(&candidates).await?;
    let retained: Vec<EntityKey> = candidates
        .iter()
        .zip(instances)
        .filter(|(_, instance)| *instance == Some(home))
        .map(|(key, _)| *key)
        .collect();

    let mut elements = Elements::default();
    if retained.is_empty() {
        return Ok(elements);
    }
    let records = store.get_many(&retained).await?;
    for (key, record) in retained.iter().zip(records) {
        match record {
            Some(record) if record.instance() == Some(home) => {
                elements.group_mut(key.kind).insert(key.id, record.to_fields());
            }
            _ => tracing::trace!(%key, "candidate left the instance mid-query"),
        }
    }

    tracing::debug!(
        %observer,
        instance = %home,
        requested = candidates.len(),
        visible = elements.len(),
        "visibility query"
    );
    Ok(elements)
}

async fn observer_instance<S: EntityStore>(
    store: &S,
    observer: EntityKey,
) -> Result<InstanceId, VisibilityError> {
    let record = store
        .get(observer)
        .await?
        .ok_or(VisibilityError::ObserverNotFound(observer))?;
    record.instance().ok_or(VisibilityError::NoInstance(observer))
}

/// Visibility query in collaborator terms: a character observer and id lists
/// per kind.
///
/// An observer that is missing or not instanced yields a denied response.
/// Only store failures are errors.
pub async fn query_visible<S: EntityStore>(
    store: &S,
    observer: CharacterId,
    characters: &[CharacterId],
    npcs: &[NpcId],
    objects: &[ObjectId],
) -> Result<VisibleResponse, StoreError> {
    let candidates = characters
        .iter()
        .map(|id| EntityKey::character(*id))
        .chain(npcs.iter().map(|id| EntityKey::npc(*id)))
        .chain(objects.iter().map(|id| EntityKey::object(*id)));

    match visible(store, EntityKey::character(observer), candidates).await {
        Ok(elements) => Ok(VisibleResponse::granted(elements)),
        Err(VisibilityError::Store(err)) => Err(err),
        Err(err) => {
            tracing::debug!(%observer, reason = %err, "visibility denied");
            Ok(VisibleResponse::denied())
        }
    }
}
