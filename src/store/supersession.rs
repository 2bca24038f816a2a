// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Lifecycle transitions: `active -> superseded` and `active -> archived`

use crate::core::types::{KnowledgeObject, NewObject, ObjectId, Status};
use crate::error::{Result, StoreError};
use crate::store::{KnowledgeStore, StoreState};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

impl KnowledgeStore {
    /// Mark `old` as replaced by `new`.
    ///
    /// Both objects must be active, distinct and in the same collection.
    /// Status and successor pointer change together under the write lock.
    pub async fn supersede(&self, old: ObjectId, new: ObjectId) -> Result<()> {
        let mut state = self.inner.state.write().await;
        check_transition(&state, old, new)?;
        apply_supersession(&mut state, old, new)?;

        debug!("Superseded {} with {}", old, new);
        Ok(())
    }

    /// Retire an active object without a successor.
    pub async fn archive(&self, id: ObjectId) -> Result<()> {
        let mut state = self.inner.state.write().await;
        let object = state.get_mut(&id)?;
        if object.status != Status::Active {
            return Err(StoreError::State {
                id,
                status: object.status,
                reason: "only active objects can be archived".to_string(),
            });
        }
        object.status = Status::Archived;
        object.updated_at = Utc::now();

        debug!("Archived {}", id);
        Ok(())
    }

    /// Create a successor for `old` and supersede it in one step.
    ///
    /// Either both the insert and the transition happen or neither does.
    pub async fn revise(&self, old: ObjectId, new: NewObject) -> Result<ObjectId> {
        let def = self.collection(&new.collection)?;
        self.validate_content(def, &new)?;

        let mut state = self.inner.state.write().await;
        let current = state.get(&old)?;
        if current.status != Status::Active {
            return Err(StoreError::State {
                id: old,
                status: current.status,
                reason: "only active objects can be superseded".to_string(),
            });
        }

        let staged = self.stage(&state, def, new)?;
        if staged.collection != current.collection {
            return Err(StoreError::CollectionMismatch {
                old,
                old_collection: current.collection.clone(),
                new: staged.id,
                new_collection: staged.collection,
            });
        }

        let new_id = staged.id;
        self.commit(&mut state, staged).await?;
        apply_supersession(&mut state, old, new_id)?;

        debug!("Revised {} as {}", old, new_id);
        Ok(new_id)
    }

    /// Follow `superseded_by` pointers to the newest version.
    pub async fn current_version(&self, id: ObjectId) -> Result<KnowledgeObject> {
        let state = self.inner.state.read().await;
        let mut current = state.get(&id)?;
        let mut seen = HashSet::from([id]);

        while let Some(next) = current.superseded_by {
            if !seen.insert(next) {
                break;
            }
            match state.objects.get(&next) {
                Some(object) => current = object,
                None => break,
            }
        }
        Ok(current.clone())
    }

    /// Every earlier version of `id`, oldest first, ending with `id` itself.
    pub async fn version_history(&self, id: ObjectId) -> Result<Vec<KnowledgeObject>> {
        let state = self.inner.state.read().await;
        state.get(&id)?;

        let mut versions: Vec<(usize, &KnowledgeObject)> = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([(id, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if let Some(object) = state.objects.get(&current) {
                versions.push((depth, object));
            }
            for predecessor in state.reverse.predecessors(&current) {
                if seen.insert(predecessor) {
                    queue.push_back((predecessor, depth + 1));
                }
            }
        }

        versions.sort_by(|(da, a), (db, b)| {
            db.cmp(da)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(versions.into_iter().map(|(_, o)| o.clone()).collect())
    }
}

fn check_transition(state: &StoreState, old: ObjectId, new: ObjectId) -> Result<()> {
    let old_object = state.get(&old)?;
    if old_object.status != Status::Active {
        return Err(StoreError::State {
            id: old,
            status: old_object.status,
            reason: "only active objects can be superseded".to_string(),
        });
    }

    let new_object = state.get(&new)?;
    if new_object.collection != old_object.collection {
        return Err(StoreError::CollectionMismatch {
            old,
            old_collection: old_object.collection.clone(),
            new,
            new_collection: new_object.collection.clone(),
        });
    }
    if old == new {
        return Err(StoreError::State {
            id: old,
            status: old_object.status,
            reason: "an object cannot supersede itself".to_string(),
        });
    }
    if new_object.status != Status::Active {
        return Err(StoreError::State {
            id: new,
            status: new_object.status,
            reason: "successor must be active".to_string(),
        });
    }
    Ok(())
}

fn apply_supersession(state: &mut StoreState, old: ObjectId, new: ObjectId) -> Result<()> {
    let object = state.get_mut(&old)?;
    object.status = Status::Superseded;
    object.superseded_by = Some(new);
    object.updated_at = Utc::now();
    state.reverse.set_successor(old, new);
    Ok(())
}
