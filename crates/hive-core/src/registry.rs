//! CapabilityRegistry - エージェント → capability の対応表
//!
//! # 設計原則
//! - 正本は CapabilityStore。メモリキャッシュは読み取り用の射影
//! - 書き込みは「ストア → キャッシュ → イベント publish」の順
//!   - ストア失敗: エラーを返し、キャッシュは触らない
//!   - publish 失敗: ログのみ（登録自体は成功）
//! - キャッシュの更新はレジストリ全体の write_lock で直列化し、
//!   ストア呼び出しからキャッシュ更新までを 1 つのクリティカルセクションにする
//! - `is_active` / `last_verified` はキャッシュ専用（再起動で失われる）

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::{
    AgentId, Capability, CapabilityId, CapabilityRecord, CapabilityRegistration, DomainEvent,
    HiveError, Result,
};
use crate::ports::{CapabilityLookup, CapabilityStore, Clock, MessageBus, publish_with_timeout};

const SENDER: &str = "capability-registry";

type Cache = BTreeMap<AgentId, BTreeMap<CapabilityId, Capability>>;

pub struct CapabilityRegistry {
    store: Arc<dyn CapabilityStore>,
    clock: Arc<dyn Clock>,
    bus: Option<Arc<dyn MessageBus>>,
    publish_timeout: Duration,
    cache: RwLock<Cache>,
    write_lock: Mutex<()>,
}

impl CapabilityRegistry {
    pub fn new(store: Arc<dyn CapabilityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            bus: None,
            publish_timeout: Duration::from_secs(2),
            cache: RwLock::new(Cache::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Publish `CAPABILITY_*` events on `bus`.
    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>, publish_timeout: Duration) -> Self {
        self.bus = Some(bus);
        self.publish_timeout = publish_timeout;
        self
    }

    /// Bulk-load the store into an empty cache. Returns the number of
    /// capabilities loaded; invalid entries are skipped.
    pub async fn load(&self) -> Result<usize> {
        self.rebuild(false).await
    }

    /// Rebuild the cache from the store, keeping the cache-only status of
    /// capabilities that are still present.
    pub async fn reload(&self) -> Result<usize> {
        self.rebuild(true).await
    }

    async fn rebuild(&self, keep_status: bool) -> Result<usize> {
        let _write = self.write_lock.lock().await;
        let raw = self.store.get_all_capabilities().await?;

        let mut fresh = Cache::new();
        let mut skipped = 0usize;
        for (agent_key, caps) in raw {
            for (cap_key, value) in caps {
                let record = serde_json::from_value::<CapabilityRecord>(value)
                    .map_err(|e| e.to_string())
                    .and_then(|record| record.validate(&agent_key, &cap_key).map(|_| record));
                match record {
                    Ok(record) => {
                        fresh
                            .entry(record.agent_id.clone())
                            .or_default()
                            .insert(record.capability_id.clone(), Capability::from_record(record));
                    }
                    Err(reason) => {
                        skipped += 1;
                        warn!(
                            agent_id = %agent_key,
                            capability_id = %cap_key,
                            %reason,
                            "skipping invalid capability entry"
                        );
                    }
                }
            }
        }

        let mut cache = self.cache.write().await;
        if keep_status {
            for (agent_id, caps) in fresh.iter_mut() {
                for (cap_id, cap) in caps.iter_mut() {
                    if let Some(old) = cache.get(agent_id).and_then(|c| c.get(cap_id)) {
                        cap.is_active = old.is_active;
                        cap.last_verified = old.last_verified;
                    }
                }
            }
        }
        let loaded = fresh.values().map(BTreeMap::len).sum();
        *cache = fresh;
        info!(loaded, skipped, "capability cache rebuilt");
        Ok(loaded)
    }

    /// Upsert a capability. `registered_at` survives re-registration.
    pub async fn register(&self, registration: CapabilityRegistration) -> Result<Capability> {
        if registration.agent_id.is_blank() || registration.capability_id.is_blank() {
            return Err(HiveError::Validation(
                "agent_id and capability_id must not be blank".into(),
            ));
        }
        if registration.capability_name.trim().is_empty() {
            return Err(HiveError::Validation("capability_name must not be empty".into()));
        }

        let capability = {
            let _write = self.write_lock.lock().await;
            let now = self.clock.now();
            let existing = self
                .get(&registration.agent_id, &registration.capability_id)
                .await;
            let record = CapabilityRecord {
                agent_id: registration.agent_id.clone(),
                capability_id: registration.capability_id.clone(),
                capability_name: registration.capability_name,
                description: registration.description,
                registered_at: existing
                    .as_ref()
                    .map_or(now, |cap| cap.record.registered_at),
                last_updated: now,
            };

            self.store
                .register_capability(&record.agent_id, &record)
                .await?;

            let mut capability = Capability::from_record(record);
            capability.last_verified = existing.and_then(|cap| cap.last_verified);
            self.cache
                .write()
                .await
                .entry(capability.agent_id().clone())
                .or_default()
                .insert(capability.capability_id().clone(), capability.clone());
            capability
        };

        info!(
            agent_id = %capability.agent_id(),
            capability_id = %capability.capability_id(),
            "capability registered"
        );
        self.publish(DomainEvent::CapabilityRegistered {
            agent_id: capability.agent_id().clone(),
            capability_id: capability.capability_id().clone(),
            capability_name: capability.name().to_string(),
        })
        .await;
        Ok(capability)
    }

    /// Remove a capability. Returns whether the store held it.
    pub async fn unregister(&self, agent_id: &AgentId, capability_id: &CapabilityId) -> Result<bool> {
        let removed = {
            let _write = self.write_lock.lock().await;
            let removed = self.store.unregister_capability(agent_id, capability_id).await?;

            let mut cache = self.cache.write().await;
            let cached = match cache.get_mut(agent_id) {
                Some(caps) => {
                    let cached = caps.remove(capability_id).is_some();
                    if caps.is_empty() {
                        cache.remove(agent_id);
                    }
                    cached
                }
                None => false,
            };
            if !cached {
                warn!(
                    agent_id = %agent_id,
                    capability_id = %capability_id,
                    "capability was not in the cache"
                );
            }
            removed
        };

        info!(agent_id = %agent_id, capability_id = %capability_id, removed, "capability unregistered");
        self.publish(DomainEvent::CapabilityUnregistered {
            agent_id: agent_id.clone(),
            capability_id: capability_id.clone(),
        })
        .await;
        Ok(removed)
    }

    /// Update the cache-only status of a capability.
    pub async fn mark_verified(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        is_active: bool,
    ) -> Result<Capability> {
        let _write = self.write_lock.lock().await;
        let mut cache = self.cache.write().await;
        let cap = cache
            .get_mut(agent_id)
            .and_then(|caps| caps.get_mut(capability_id))
            .ok_or_else(|| HiveError::NotFound {
                entity: "capability",
                id: format!("{agent_id}/{capability_id}"),
            })?;
        cap.is_active = is_active;
        cap.last_verified = Some(self.clock.now());
        debug!(agent_id = %agent_id, capability_id = %capability_id, is_active, "capability verified");
        Ok(cap.clone())
    }

    pub async fn get(&self, agent_id: &AgentId, capability_id: &CapabilityId) -> Option<Capability> {
        self.cache
            .read()
            .await
            .get(agent_id)
            .and_then(|caps| caps.get(capability_id))
            .cloned()
    }

    pub async fn list_for_agent(&self, agent_id: &AgentId) -> Vec<Capability> {
        self.cache
            .read()
            .await
            .get(agent_id)
            .map(|caps| caps.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn list_all(&self) -> Vec<Capability> {
        self.cache
            .read()
            .await
            .values()
            .flat_map(|caps| caps.values().cloned())
            .collect()
    }

    /// Case-insensitive substring match on `capability_name`.
    pub async fn find_by_name(&self, query: &str) -> Vec<Capability> {
        let needle = query.to_lowercase();
        self.cache
            .read()
            .await
            .values()
            .flat_map(|caps| caps.values())
            .filter(|cap| cap.name().to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Active agents offering `capability_id`, in agent-id order.
    pub async fn find_agents_for(&self, capability_id: &CapabilityId) -> Vec<AgentId> {
        self.cache
            .read()
            .await
            .iter()
            .filter(|(_, caps)| caps.get(capability_id).is_some_and(|cap| cap.is_active))
            .map(|(agent_id, _)| agent_id.clone())
            .collect()
    }

    /// First active agent whose capability id equals `capability`, or whose
    /// name equals it ignoring case.
    pub async fn find_first_agent_by_capability(&self, capability: &str) -> Option<AgentId> {
        self.cache
            .read()
            .await
            .iter()
            .find(|(_, caps)| {
                caps.values().any(|cap| {
                    cap.is_active
                        && (cap.capability_id().as_str() == capability
                            || cap.name().eq_ignore_ascii_case(capability))
                })
            })
            .map(|(agent_id, _)| agent_id.clone())
    }

    async fn publish(&self, event: DomainEvent) {
        let Some(bus) = &self.bus else {
            return;
        };
        let event_type = event.event_type();
        let message = event.into_message().from_sender(SENDER);
        if let Err(err) = publish_with_timeout(bus.as_ref(), message, self.publish_timeout).await {
            warn!(event_type, error = %err, "failed to publish capability event");
        }
    }
}

#[async_trait]
impl CapabilityLookup for CapabilityRegistry {
    async fn find_first_agent_by_capability(&self, capability: &str) -> Option<AgentId> {
        CapabilityRegistry::find_first_agent_by_capability(self, capability).await
    }
}
