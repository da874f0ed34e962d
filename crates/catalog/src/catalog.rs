//! The entity catalog.
//!
//! State is split per namespace: each namespace has its own reader/writer lock, so DDL on one
//! namespace never blocks reads of another. Lock order is adapters, namespace registry, namespace
//! contents in ascending id order, then the id indexes and the journal.

use crate::adapter::AdapterInfo;
use crate::config::CatalogConfig;
use crate::coverage::uncovered_columns;
use crate::entity::{
    AllocationEntity, AllocationSpec, LogicalEntity, Namespace, PhysicalEntity,
};
use crate::journal::{EntityChange, Journal, JournalOp, JournalRecord};
use crate::transaction::{NoOpenTransactions, TransactionCollaborator};
use hashbrown::HashMap;
use log::{debug, warn};
use polystore_core::ids::{
    AdapterId, AllocationId, ColumnId, LogicalEntityId, NamespaceId, PhysicalEntityId,
};
use polystore_core::schema::{check_naming_rules, EntitySchema, LogicalColumn};
use polystore_core::traits::Convention;
use polystore_core::{DataModel, Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// A consistent view of one logical entity and its placements.
#[derive(Clone, Debug)]
pub struct EntitySnapshot {
    pub entity: LogicalEntity,
    /// Allocations in id order.
    pub allocations: Vec<AllocationEntity>,
    pub physicals: Vec<PhysicalEntity>,
}

#[derive(Debug, Default)]
struct NamespaceContent {
    entities: BTreeMap<LogicalEntityId, LogicalEntity>,
    allocations: BTreeMap<AllocationId, AllocationEntity>,
    physicals: BTreeMap<PhysicalEntityId, PhysicalEntity>,
    /// Set under the write lock when the namespace is dropped. Holders of a stale
    /// `NamespaceState` must check it before adding content.
    dropped: bool,
}

impl NamespaceContent {
    fn entity(&self, id: LogicalEntityId) -> Result<&LogicalEntity> {
        self.entities.get(&id).ok_or_else(|| Error::entity_not_found(id))
    }

    fn allocations_of(&self, logical: LogicalEntityId) -> impl Iterator<Item = &AllocationEntity> {
        self.allocations.values().filter(move |a| a.logical == logical)
    }

    fn physicals_of(&self, allocation: AllocationId) -> impl Iterator<Item = &PhysicalEntity> {
        self.physicals
            .values()
            .filter(move |p| p.allocation == allocation)
    }

    fn entity_named(&self, name: &str) -> Option<&LogicalEntity> {
        self.entities.values().find(|e| e.name == name)
    }
}

struct NamespaceState {
    namespace: Namespace,
    content: RwLock<NamespaceContent>,
}

impl NamespaceState {
    fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            content: RwLock::new(NamespaceContent::default()),
        }
    }
}

/// Rejects `allocations` unless together they hold every column of `entity` in every partition.
fn check_coverage(entity: &LogicalEntity, allocations: &[&AllocationEntity]) -> Result<()> {
    let partition_count = allocations
        .first()
        .map(|a| a.partitioning.partition_count)
        .unwrap_or(1);
    let uncovered = uncovered_columns(&entity.schema, partition_count, allocations.iter().copied());
    if uncovered.is_empty() {
        Ok(())
    } else {
        Err(Error::incomplete_coverage(
            entity.qualified_name(),
            entity.column_names(uncovered),
        ))
    }
}

/// Turns a placement request into an allocation record.
fn build_allocation(
    id: AllocationId,
    entity: &LogicalEntity,
    adapter: &AdapterInfo,
    spec: &AllocationSpec,
) -> Result<AllocationEntity> {
    if !adapter.supports(entity.model) {
        return Err(Error::AdapterIncompatibleModel {
            adapter: adapter.name().to_string(),
            model: entity.model,
        });
    }

    let columns: BTreeSet<ColumnId> = match &spec.columns {
        None => entity.schema.column_ids().into_iter().collect(),
        Some(names) => names
            .iter()
            .map(|name| {
                entity
                    .column(name)
                    .map(|c| c.id())
                    .ok_or_else(|| Error::column_not_found(entity.qualified_name(), name.as_str()))
            })
            .collect::<Result<_>>()?,
    };
    if columns.is_empty() {
        return Err(Error::invalid_operation(
            "An allocation must hold at least one column",
        ));
    }

    let partitioning = spec.partitioning.clone();
    if partitioning.partition_count == 0 {
        return Err(Error::invalid_operation("Partition count must be positive"));
    }
    if let Some(column) = &partitioning.column {
        if entity.column(column).is_none() {
            return Err(Error::column_not_found(
                entity.qualified_name(),
                column.as_str(),
            ));
        }
    }
    let all = partitioning.all_partitions();
    let partitions: BTreeSet<u32> = match &spec.partitions {
        None => all.clone(),
        Some(p) => p.iter().copied().collect(),
    };
    if partitions.is_empty() || !partitions.is_subset(&all) {
        return Err(Error::invalid_operation(format!(
            "Partitions {:?} are not a non-empty subset of 0..{}",
            partitions, partitioning.partition_count
        )));
    }

    Ok(AllocationEntity {
        id,
        logical: entity.id,
        namespace: entity.namespace,
        adapter: adapter.id(),
        convention: adapter.convention(),
        columns,
        partitioning,
        partitions,
        role: spec.role,
        placement_type: spec.placement_type,
    })
}

/// The multi-model entity catalog.
pub struct Catalog {
    config: CatalogConfig,
    transactions: Arc<dyn TransactionCollaborator>,
    next_id: AtomicU64,
    adapters: RwLock<BTreeMap<AdapterId, AdapterInfo>>,
    namespaces: RwLock<BTreeMap<NamespaceId, Arc<NamespaceState>>>,
    entity_index: RwLock<HashMap<LogicalEntityId, NamespaceId>>,
    allocation_index: RwLock<HashMap<AllocationId, NamespaceId>>,
    physical_index: RwLock<HashMap<PhysicalEntityId, NamespaceId>>,
    journal: Journal,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(CatalogConfig::default())
    }
}

impl Catalog {
    /// Creates an empty catalog that assumes no open transactions.
    pub fn new(config: CatalogConfig) -> Self {
        Self::with_transactions(config, Arc::new(NoOpenTransactions))
    }

    /// Creates an empty catalog consulting `transactions` before destructive DDL.
    pub fn with_transactions(
        config: CatalogConfig,
        transactions: Arc<dyn TransactionCollaborator>,
    ) -> Self {
        Self {
            config,
            transactions,
            next_id: AtomicU64::new(1),
            adapters: RwLock::new(BTreeMap::new()),
            namespaces: RwLock::new(BTreeMap::new()),
            entity_index: RwLock::new(HashMap::new()),
            allocation_index: RwLock::new(HashMap::new()),
            physical_index: RwLock::new(HashMap::new()),
            journal: Journal::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Returns the change journal.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn namespace_state(&self, id: NamespaceId) -> Result<Arc<NamespaceState>> {
        read(&self.namespaces)
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::namespace_not_found(id))
    }

    fn state_of_entity(&self, id: LogicalEntityId) -> Result<Arc<NamespaceState>> {
        let ns = read(&self.entity_index)
            .get(&id)
            .copied()
            .ok_or_else(|| Error::entity_not_found(id))?;
        self.namespace_state(ns)
    }

    fn state_of_allocation(&self, id: AllocationId) -> Result<Arc<NamespaceState>> {
        let ns = read(&self.allocation_index)
            .get(&id)
            .copied()
            .ok_or_else(|| Error::allocation_not_found(id))?;
        self.namespace_state(ns)
    }

    fn state_of_physical(&self, id: PhysicalEntityId) -> Result<Arc<NamespaceState>> {
        let ns = read(&self.physical_index)
            .get(&id)
            .copied()
            .ok_or_else(|| Error::PhysicalEntityNotFound {
                physical: id.to_string(),
            })?;
        self.namespace_state(ns)
    }

    // ---- adapters ----

    /// Registers an adapter instance executing `convention` and able to hold `models`.
    pub fn register_adapter(
        &self,
        name: &str,
        convention: Convention,
        models: &[DataModel],
    ) -> Result<AdapterId> {
        check_naming_rules(name)?;
        if !convention.is_physical() {
            return Err(Error::invalid_operation(
                "Adapters must expose an executable convention",
            ));
        }
        if models.is_empty() {
            return Err(Error::invalid_operation(format!(
                "Adapter {} supports no data model",
                name
            )));
        }

        let mut adapters = write(&self.adapters);
        if adapters.values().any(|a| a.name() == name) {
            return Err(Error::duplicate_name("adapters", name));
        }
        let id = AdapterId::new(self.next_id());
        let info = AdapterInfo::new(id, name.to_string(), convention, models.to_vec());
        let payload = Journal::encode(&info)?;
        adapters.insert(id, info);
        self.journal
            .append(JournalOp::AdapterRegistered, id.raw(), payload);
        debug!("Registered adapter {} ({}) as {}", name, id, convention);
        Ok(id)
    }

    /// Drops an adapter and every allocation placed on it, across all namespaces.
    ///
    /// Fails with `IncompleteCoverage`, changing nothing, if an affected entity would be left
    /// without a placement for some column.
    pub fn drop_adapter(&self, id: AdapterId) -> Result<()> {
        let mut adapters = write(&self.adapters);
        let adapter = adapters
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::adapter_not_found(id))?;

        let states: Vec<Arc<NamespaceState>> = read(&self.namespaces).values().cloned().collect();
        let mut guards: Vec<RwLockWriteGuard<'_, NamespaceContent>> =
            states.iter().map(|s| write(&s.content)).collect();

        let mut removals = Vec::new();
        for (index, content) in guards.iter().enumerate() {
            let affected: BTreeSet<LogicalEntityId> = content
                .allocations
                .values()
                .filter(|a| a.adapter == id)
                .map(|a| a.logical)
                .collect();
            for logical in affected {
                let entity = content.entity(logical)?;
                let remaining: Vec<&AllocationEntity> = content
                    .allocations_of(logical)
                    .filter(|a| a.adapter != id)
                    .collect();
                check_coverage(entity, &remaining)?;
            }
            for alloc in content.allocations.values().filter(|a| a.adapter == id) {
                removals.push((index, alloc.id, Journal::encode(alloc)?));
            }
        }
        let adapter_payload = Journal::encode(&adapter)?;

        for (index, alloc, payload) in removals {
            self.remove_allocation_locked(&mut guards[index], alloc);
            self.journal
                .append(JournalOp::AllocationRemoved, alloc.raw(), payload);
        }
        adapters.remove(&id);
        self.journal
            .append(JournalOp::AdapterDropped, id.raw(), adapter_payload);
        debug!("Dropped adapter {} ({})", adapter.name(), id);
        Ok(())
    }

    /// Gets an adapter by id.
    pub fn adapter(&self, id: AdapterId) -> Result<AdapterInfo> {
        read(&self.adapters)
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::adapter_not_found(id))
    }

    /// Gets an adapter by name.
    pub fn adapter_by_name(&self, name: &str) -> Result<AdapterInfo> {
        read(&self.adapters)
            .values()
            .find(|a| a.name() == name)
            .cloned()
            .ok_or_else(|| Error::adapter_not_found(name))
    }

    /// Returns all adapters in id order.
    pub fn adapters(&self) -> Vec<AdapterInfo> {
        read(&self.adapters).values().cloned().collect()
    }

    // ---- namespaces ----

    /// Creates a namespace.
    pub fn create_namespace(&self, name: &str, model: DataModel) -> Result<NamespaceId> {
        check_naming_rules(name)?;
        if !self.config.supports(model) {
            return Err(Error::unsupported_model(model.name()));
        }

        let mut namespaces = write(&self.namespaces);
        if namespaces.values().any(|s| s.namespace.name == name) {
            return Err(Error::duplicate_name("namespaces", name));
        }
        let id = NamespaceId::new(self.next_id());
        let namespace = Namespace {
            id,
            name: name.to_string(),
            model,
        };
        let payload = Journal::encode(&namespace)?;
        namespaces.insert(id, Arc::new(NamespaceState::new(namespace)));
        self.journal
            .append(JournalOp::NamespaceCreated, id.raw(), payload);
        debug!("Created namespace {} ({}) as {}", name, id, model);
        Ok(id)
    }

    /// Drops an empty namespace.
    pub fn drop_namespace(&self, id: NamespaceId) -> Result<()> {
        let mut namespaces = write(&self.namespaces);
        let state = namespaces
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::namespace_not_found(id))?;
        let mut content = write(&state.content);
        if !content.entities.is_empty() {
            return Err(Error::NamespaceNotEmpty {
                namespace: state.namespace.name.clone(),
            });
        }
        let payload = Journal::encode(&state.namespace)?;
        content.dropped = true;
        namespaces.remove(&id);
        self.journal
            .append(JournalOp::NamespaceDropped, id.raw(), payload);
        debug!("Dropped namespace {} ({})", state.namespace.name, id);
        Ok(())
    }

    /// Gets a namespace by id.
    pub fn namespace(&self, id: NamespaceId) -> Result<Namespace> {
        Ok(self.namespace_state(id)?.namespace.clone())
    }

    /// Gets a namespace by name.
    pub fn namespace_by_name(&self, name: &str) -> Result<Namespace> {
        read(&self.namespaces)
            .values()
            .find(|s| s.namespace.name == name)
            .map(|s| s.namespace.clone())
            .ok_or_else(|| Error::namespace_not_found(name))
    }

    /// Returns all namespaces in id order.
    pub fn namespaces(&self) -> Vec<Namespace> {
        read(&self.namespaces)
            .values()
            .map(|s| s.namespace.clone())
            .collect()
    }

    // ---- logical entities ----

    /// Creates a logical entity. The catalog assigns column ids.
    pub fn create_logical_entity(
        &self,
        namespace: NamespaceId,
        name: &str,
        schema: EntitySchema,
    ) -> Result<LogicalEntityId> {
        check_naming_rules(name)?;
        let state = self.namespace_state(namespace)?;
        self.create_entity_in(&state, name, schema)
    }

    /// Creates an entity in a namespace resolved earlier, which may have been dropped since.
    fn create_entity_in(
        &self,
        state: &NamespaceState,
        name: &str,
        schema: EntitySchema,
    ) -> Result<LogicalEntityId> {
        let namespace = state.namespace.id;
        let model = state.namespace.model;
        if model != DataModel::Graph && !schema.labels().is_empty() {
            return Err(Error::invalid_schema(format!(
                "Labels are only allowed in graph namespaces, {} is {}",
                state.namespace.name, model
            )));
        }

        let mut content = write(&state.content);
        if content.dropped {
            return Err(Error::namespace_not_found(namespace));
        }
        if content.entity_named(name).is_some() {
            return Err(Error::duplicate_name(state.namespace.name.as_str(), name));
        }
        let id = LogicalEntityId::new(self.next_id());
        let column_ids: Vec<ColumnId> = schema
            .columns()
            .iter()
            .map(|_| ColumnId::new(self.next_id()))
            .collect();
        let entity = LogicalEntity {
            id,
            namespace,
            namespace_name: state.namespace.name.clone(),
            name: name.to_string(),
            model,
            schema: schema.with_column_ids(&column_ids),
        };
        let payload = Journal::encode(&entity)?;
        self.insert_entity_locked(&mut content, entity);
        self.journal
            .append(JournalOp::EntityCreated, id.raw(), payload);
        debug!(
            "Created {} entity {}.{} ({})",
            model, state.namespace.name, name, id
        );
        Ok(id)
    }

    /// Drops a logical entity with all of its allocations and physical entities.
    pub fn drop_logical_entity(&self, id: LogicalEntityId) -> Result<()> {
        let state = self.state_of_entity(id)?;
        let mut content = write(&state.content);
        let entity = content.entity(id)?.clone();
        if self.transactions.is_entity_referenced(id) {
            return Err(Error::EntityInUse {
                entity: entity.qualified_name(),
            });
        }
        let payload = Journal::encode(&entity)?;
        self.remove_entity_locked(&mut content, id);
        self.journal
            .append(JournalOp::EntityDropped, id.raw(), payload);
        debug!("Dropped entity {} ({})", entity.qualified_name(), id);
        Ok(())
    }

    /// Renames a logical entity within its namespace.
    pub fn rename_logical_entity(&self, id: LogicalEntityId, new_name: &str) -> Result<()> {
        check_naming_rules(new_name)?;
        let state = self.state_of_entity(id)?;
        let mut content = write(&state.content);
        let mut entity = content.entity(id)?.clone();
        if content.entity_named(new_name).is_some_and(|other| other.id != id) {
            return Err(Error::duplicate_name(
                state.namespace.name.as_str(),
                new_name,
            ));
        }
        let old = std::mem::replace(&mut entity.name, new_name.to_string());
        self.commit_entity_change(
            &mut content,
            EntityChange {
                entity,
                allocations: Vec::new(),
                removed_allocations: Vec::new(),
            },
        )?;
        debug!("Renamed entity {} to {} ({})", old, new_name, id);
        Ok(())
    }

    /// Adds a column and places it on every primary allocation (every allocation if none is
    /// primary, or if the primaries do not hold every partition).
    pub fn add_column(&self, id: LogicalEntityId, column: LogicalColumn) -> Result<ColumnId> {
        let state = self.state_of_entity(id)?;
        let mut content = write(&state.content);
        let mut entity = content.entity(id)?.clone();
        let column_id = ColumnId::new(self.next_id());
        entity.schema = entity.schema.with_added_column(column.with_id(column_id))?;

        let existing: Vec<AllocationEntity> = content.allocations_of(id).cloned().collect();
        let with_column = |targets: &dyn Fn(&AllocationEntity) -> bool| -> Vec<AllocationEntity> {
            existing
                .iter()
                .map(|a| {
                    let mut a = a.clone();
                    if targets(&a) {
                        a.columns.insert(column_id);
                    }
                    a
                })
                .collect()
        };
        let mut allocations = if existing.iter().any(|a| a.is_primary()) {
            with_column(&|a: &AllocationEntity| a.is_primary())
        } else {
            with_column(&|_: &AllocationEntity| true)
        };
        let placed: Vec<&AllocationEntity> = allocations.iter().collect();
        if !existing.is_empty() && check_coverage(&entity, &placed).is_err() {
            allocations = with_column(&|_: &AllocationEntity| true);
        }
        allocations.retain(|a| a.holds_column(column_id));

        let name = entity.column_name(column_id);
        self.commit_entity_change(
            &mut content,
            EntityChange {
                entity,
                allocations,
                removed_allocations: Vec::new(),
            },
        )?;
        debug!("Added column {} ({}) to {}", name, column_id, id);
        Ok(column_id)
    }

    /// Drops a column from the schema and from every allocation holding it.
    ///
    /// Allocations left without columns are removed together with their physical entities.
    pub fn drop_column(&self, id: LogicalEntityId, name: &str) -> Result<()> {
        let state = self.state_of_entity(id)?;
        let mut content = write(&state.content);
        let mut entity = content.entity(id)?.clone();
        let column_id = entity
            .column(name)
            .map(|c| c.id())
            .ok_or_else(|| Error::column_not_found(entity.qualified_name(), name))?;
        if self.transactions.is_entity_referenced(id) {
            return Err(Error::EntityInUse {
                entity: entity.qualified_name(),
            });
        }
        entity.schema = entity.schema.without_column(name)?;

        let mut allocations = Vec::new();
        let mut removed_allocations = Vec::new();
        for alloc in content.allocations_of(id).filter(|a| a.holds_column(column_id)) {
            let mut alloc = alloc.clone();
            alloc.columns.remove(&column_id);
            if alloc.columns.is_empty() {
                removed_allocations.push(alloc.id);
            } else {
                allocations.push(alloc);
            }
        }
        self.commit_entity_change(
            &mut content,
            EntityChange {
                entity,
                allocations,
                removed_allocations,
            },
        )?;
        debug!("Dropped column {} ({}) from {}", name, column_id, id);
        Ok(())
    }

    /// Renames a column. Physical column names are unaffected.
    pub fn rename_column(&self, id: LogicalEntityId, old: &str, new: &str) -> Result<()> {
        let state = self.state_of_entity(id)?;
        let mut content = write(&state.content);
        let mut entity = content.entity(id)?.clone();
        if entity.column(old).is_none() {
            return Err(Error::column_not_found(entity.qualified_name(), old));
        }
        entity.schema = entity.schema.with_renamed_column(old, new)?;
        self.commit_entity_change(
            &mut content,
            EntityChange {
                entity,
                allocations: Vec::new(),
                removed_allocations: Vec::new(),
            },
        )?;
        debug!("Renamed column {} to {} in {}", old, new, id);
        Ok(())
    }

    fn commit_entity_change(
        &self,
        content: &mut NamespaceContent,
        change: EntityChange,
    ) -> Result<()> {
        let id = change.entity.id;
        let payload = Journal::encode(&change)?;
        self.apply_entity_change_locked(content, change);
        self.journal
            .append(JournalOp::EntityAltered, id.raw(), payload);
        Ok(())
    }

    /// Gets a logical entity by id.
    pub fn logical_entity(&self, id: LogicalEntityId) -> Result<LogicalEntity> {
        let state = self.state_of_entity(id)?;
        let content = read(&state.content);
        content.entity(id).cloned()
    }

    /// Gets a logical entity by namespace and name.
    pub fn logical_entity_by_name(
        &self,
        namespace: NamespaceId,
        name: &str,
    ) -> Result<LogicalEntity> {
        let state = self.namespace_state(namespace)?;
        let content = read(&state.content);
        content.entity_named(name).cloned().ok_or_else(|| {
            Error::entity_not_found(format!("{}.{}", state.namespace.name, name))
        })
    }

    /// Returns the entities of a namespace in id order.
    pub fn logical_entities(&self, namespace: NamespaceId) -> Result<Vec<LogicalEntity>> {
        let state = self.namespace_state(namespace)?;
        let content = read(&state.content);
        Ok(content.entities.values().cloned().collect())
    }

    // ---- allocations ----

    /// Places a logical entity (or part of it) on an adapter.
    pub fn add_allocation(
        &self,
        logical: LogicalEntityId,
        spec: AllocationSpec,
    ) -> Result<AllocationId> {
        let ids = self.add_allocation_group(logical, vec![spec])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::invalid_operation("Allocation group produced no allocation"))
    }

    /// Adds several allocations atomically, checking coverage of the result as a whole.
    ///
    /// This is how a vertically or horizontally split entity receives its first placements.
    pub fn add_allocation_group(
        &self,
        logical: LogicalEntityId,
        specs: Vec<AllocationSpec>,
    ) -> Result<Vec<AllocationId>> {
        if specs.is_empty() {
            return Err(Error::invalid_operation("Empty allocation group"));
        }
        let adapters = read(&self.adapters);
        let state = self.state_of_entity(logical)?;
        let mut content = write(&state.content);
        let entity = content.entity(logical)?.clone();

        let mut created = Vec::with_capacity(specs.len());
        for spec in &specs {
            let adapter = adapters
                .get(&spec.adapter)
                .ok_or_else(|| Error::adapter_not_found(spec.adapter))?;
            created.push(build_allocation(
                AllocationId::new(0),
                &entity,
                adapter,
                spec,
            )?);
        }

        let existing: Vec<&AllocationEntity> = content.allocations_of(logical).collect();
        let expected = existing
            .first()
            .map(|a| &a.partitioning)
            .unwrap_or(&created[0].partitioning);
        if let Some(bad) = created.iter().find(|a| a.partitioning != *expected) {
            return Err(Error::invalid_operation(format!(
                "Partitioning {:?} of {} does not match {:?}",
                bad.partitioning,
                entity.qualified_name(),
                expected
            )));
        }
        let mut used: BTreeSet<AdapterId> = existing.iter().map(|a| a.adapter).collect();
        for alloc in &created {
            if !used.insert(alloc.adapter) {
                let name = adapters
                    .get(&alloc.adapter)
                    .map(|a| a.name().to_string())
                    .unwrap_or_else(|| alloc.adapter.to_string());
                return Err(Error::duplicate_name(entity.qualified_name(), name));
            }
        }
        let combined: Vec<&AllocationEntity> =
            existing.iter().copied().chain(created.iter()).collect();
        check_coverage(&entity, &combined)?;

        let mut records = Vec::with_capacity(created.len());
        for mut alloc in created {
            alloc.id = AllocationId::new(self.next_id());
            let payload = Journal::encode(&alloc)?;
            records.push((alloc, payload));
        }
        let mut ids = Vec::with_capacity(records.len());
        for (alloc, payload) in records {
            let id = alloc.id;
            debug!(
                "Placed {} on {} as {} ({:?}, {} column(s), partitions {:?})",
                entity.qualified_name(),
                alloc.adapter,
                id,
                alloc.role,
                alloc.columns.len(),
                alloc.partitions
            );
            self.insert_allocation_locked(&mut content, alloc);
            self.journal
                .append(JournalOp::AllocationAdded, id.raw(), payload);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Removes an allocation and its physical entities.
    ///
    /// Fails with `IncompleteCoverage`, changing nothing, if the remaining allocations would not
    /// hold every column.
    pub fn drop_allocation(&self, id: AllocationId) -> Result<()> {
        let state = self.state_of_allocation(id)?;
        let mut content = write(&state.content);
        let alloc = content
            .allocations
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::allocation_not_found(id))?;
        let entity = content.entity(alloc.logical)?;
        let remaining: Vec<&AllocationEntity> = content
            .allocations_of(alloc.logical)
            .filter(|a| a.id != id)
            .collect();
        check_coverage(entity, &remaining)?;

        let payload = Journal::encode(&alloc)?;
        self.remove_allocation_locked(&mut content, id);
        self.journal
            .append(JournalOp::AllocationRemoved, id.raw(), payload);
        debug!("Dropped allocation {} of {}", id, alloc.logical);
        Ok(())
    }

    /// Gets an allocation by id.
    pub fn allocation(&self, id: AllocationId) -> Result<AllocationEntity> {
        let state = self.state_of_allocation(id)?;
        let content = read(&state.content);
        content
            .allocations
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::allocation_not_found(id))
    }

    /// Returns the allocations of a logical entity in id order.
    pub fn resolve_allocations(&self, logical: LogicalEntityId) -> Result<Vec<AllocationEntity>> {
        let state = self.state_of_entity(logical)?;
        let content = read(&state.content);
        content.entity(logical)?;
        Ok(content.allocations_of(logical).cloned().collect())
    }

    /// Returns an entity with its allocations and physical entities, read under one lock.
    pub fn entity_snapshot(&self, logical: LogicalEntityId) -> Result<EntitySnapshot> {
        let state = self.state_of_entity(logical)?;
        let content = read(&state.content);
        let entity = content.entity(logical)?.clone();
        let allocations: Vec<AllocationEntity> = content.allocations_of(logical).cloned().collect();
        let physicals = allocations
            .iter()
            .flat_map(|a| content.physicals_of(a.id).cloned())
            .collect();
        Ok(EntitySnapshot {
            entity,
            allocations,
            physicals,
        })
    }

    // ---- physical entities ----

    /// Records that an adapter materialized `allocation` as `handle`.
    ///
    /// Calling it again with the same handle returns the existing id.
    pub fn materialize_physical(
        &self,
        allocation: AllocationId,
        handle: &str,
    ) -> Result<PhysicalEntityId> {
        let state = self.state_of_allocation(allocation)?;
        let mut content = write(&state.content);
        let alloc = content
            .allocations
            .get(&allocation)
            .ok_or_else(|| Error::allocation_not_found(allocation))?;
        if let Some(existing) = content.physicals_of(allocation).find(|p| p.handle == handle) {
            return Ok(existing.id);
        }
        let entity = content.entity(alloc.logical)?;
        let column_mapping = alloc
            .columns
            .iter()
            .map(|c| (*c, entity.column_name(*c)))
            .collect();
        let physical = PhysicalEntity {
            id: PhysicalEntityId::new(self.next_id()),
            allocation,
            handle: handle.to_string(),
            column_mapping,
        };
        let id = physical.id;
        let payload = Journal::encode(&physical)?;
        self.insert_physical_locked(&mut content, physical);
        self.journal
            .append(JournalOp::PhysicalMaterialized, id.raw(), payload);
        debug!("Materialized {} as {} ({})", allocation, handle, id);
        Ok(id)
    }

    /// Forgets a physical entity its adapter reports missing.
    ///
    /// Returns the allocation that now needs to be materialized again.
    pub fn report_missing_physical(&self, id: PhysicalEntityId) -> Result<AllocationId> {
        let state = self.state_of_physical(id)?;
        let mut content = write(&state.content);
        let physical = content
            .physicals
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::PhysicalEntityNotFound {
                physical: id.to_string(),
            })?;
        let payload = Journal::encode(&physical)?;
        self.remove_physical_locked(&mut content, id);
        self.journal
            .append(JournalOp::PhysicalRemoved, id.raw(), payload);
        warn!(
            "Physical entity {} ({}) of {} reported missing, allocation needs re-materialization",
            physical.handle, id, physical.allocation
        );
        Ok(physical.allocation)
    }

    /// Returns the physical entities of an allocation in id order.
    pub fn resolve_physicals(&self, allocation: AllocationId) -> Result<Vec<PhysicalEntity>> {
        let state = self.state_of_allocation(allocation)?;
        let content = read(&state.content);
        if !content.allocations.contains_key(&allocation) {
            return Err(Error::allocation_not_found(allocation));
        }
        Ok(content.physicals_of(allocation).cloned().collect())
    }

    // ---- state changes shared by live mutations and replay ----

    fn insert_entity_locked(&self, content: &mut NamespaceContent, entity: LogicalEntity) {
        write(&self.entity_index).insert(entity.id, entity.namespace);
        content.entities.insert(entity.id, entity);
    }

    fn remove_entity_locked(&self, content: &mut NamespaceContent, id: LogicalEntityId) {
        let allocations: Vec<AllocationId> = content.allocations_of(id).map(|a| a.id).collect();
        for alloc in allocations {
            self.remove_allocation_locked(content, alloc);
        }
        content.entities.remove(&id);
        write(&self.entity_index).remove(&id);
    }

    fn insert_allocation_locked(&self, content: &mut NamespaceContent, alloc: AllocationEntity) {
        write(&self.allocation_index).insert(alloc.id, alloc.namespace);
        content.allocations.insert(alloc.id, alloc);
    }

    fn remove_allocation_locked(&self, content: &mut NamespaceContent, id: AllocationId) {
        let physicals: Vec<PhysicalEntityId> = content.physicals_of(id).map(|p| p.id).collect();
        for physical in physicals {
            self.remove_physical_locked(content, physical);
        }
        content.allocations.remove(&id);
        write(&self.allocation_index).remove(&id);
    }

    fn insert_physical_locked(&self, content: &mut NamespaceContent, physical: PhysicalEntity) {
        if let Some(alloc) = content.allocations.get(&physical.allocation) {
            write(&self.physical_index).insert(physical.id, alloc.namespace);
        }
        content.physicals.insert(physical.id, physical);
    }

    fn remove_physical_locked(&self, content: &mut NamespaceContent, id: PhysicalEntityId) {
        content.physicals.remove(&id);
        write(&self.physical_index).remove(&id);
    }

    fn apply_entity_change_locked(&self, content: &mut NamespaceContent, change: EntityChange) {
        for id in &change.removed_allocations {
            self.remove_allocation_locked(content, *id);
        }
        for alloc in change.allocations {
            for physical in content.physicals.values_mut() {
                if physical.allocation == alloc.id {
                    physical
                        .column_mapping
                        .retain(|column, _| alloc.columns.contains(column));
                }
            }
            content.allocations.insert(alloc.id, alloc);
        }
        content.entities.insert(change.entity.id, change.entity);
    }

    // ---- replay ----

    /// Rebuilds a catalog from journal records, applied in order.
    ///
    /// Ids, names and placements of the result equal those of the catalog that wrote the
    /// records, and its journal holds the same records.
    pub fn replay(
        config: CatalogConfig,
        records: impl IntoIterator<Item = JournalRecord>,
        transactions: Arc<dyn TransactionCollaborator>,
    ) -> Result<Self> {
        let catalog = Self::with_transactions(config, transactions);
        let mut max_id = 0;
        let mut count = 0usize;
        for record in records {
            catalog.apply_record(&record, &mut max_id)?;
            catalog.journal.push_replayed(record);
            count += 1;
        }
        catalog.next_id.store(max_id + 1, Ordering::SeqCst);
        debug!("Replayed {} journal record(s)", count);
        Ok(catalog)
    }

    fn apply_record(&self, record: &JournalRecord, max_id: &mut u64) -> Result<()> {
        *max_id = (*max_id).max(record.entity_id);
        let track_columns = |entity: &LogicalEntity, max_id: &mut u64| {
            for column in entity.schema.columns() {
                *max_id = (*max_id).max(column.id().raw());
            }
        };

        match record.op {
            JournalOp::AdapterRegistered => {
                let adapter: AdapterInfo = record.decode()?;
                write(&self.adapters).insert(adapter.id(), adapter);
            }
            JournalOp::AdapterDropped => {
                write(&self.adapters).remove(&AdapterId::new(record.entity_id));
            }
            JournalOp::NamespaceCreated => {
                let namespace: Namespace = record.decode()?;
                write(&self.namespaces).insert(namespace.id, Arc::new(NamespaceState::new(namespace)));
            }
            JournalOp::NamespaceDropped => {
                write(&self.namespaces).remove(&NamespaceId::new(record.entity_id));
            }
            JournalOp::EntityCreated => {
                let entity: LogicalEntity = record.decode()?;
                track_columns(&entity, max_id);
                let state = self.namespace_state(entity.namespace)?;
                let mut content = write(&state.content);
                self.insert_entity_locked(&mut content, entity);
            }
            JournalOp::EntityAltered => {
                let change: EntityChange = record.decode()?;
                track_columns(&change.entity, max_id);
                let state = self.namespace_state(change.entity.namespace)?;
                let mut content = write(&state.content);
                self.apply_entity_change_locked(&mut content, change);
            }
            JournalOp::EntityDropped => {
                let entity: LogicalEntity = record.decode()?;
                let state = self.namespace_state(entity.namespace)?;
                let mut content = write(&state.content);
                self.remove_entity_locked(&mut content, entity.id);
            }
            JournalOp::AllocationAdded => {
                let alloc: AllocationEntity = record.decode()?;
                let state = self.namespace_state(alloc.namespace)?;
                let mut content = write(&state.content);
                self.insert_allocation_locked(&mut content, alloc);
            }
            JournalOp::AllocationRemoved => {
                let alloc: AllocationEntity = record.decode()?;
                let state = self.namespace_state(alloc.namespace)?;
                let mut content = write(&state.content);
                self.remove_allocation_locked(&mut content, alloc.id);
            }
            JournalOp::PhysicalMaterialized => {
                let physical: PhysicalEntity = record.decode()?;
                let state = self.state_of_allocation(physical.allocation)?;
                let mut content = write(&state.content);
                self.insert_physical_locked(&mut content, physical);
            }
            JournalOp::PhysicalRemoved => {
                let physical: PhysicalEntity = record.decode()?;
                let state = self.state_of_allocation(physical.allocation)?;
                let mut content = write(&state.content);
                self.remove_physical_locked(&mut content, physical.id);
            }
        }
        Ok(())
    }
}
