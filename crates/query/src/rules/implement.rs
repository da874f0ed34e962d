//! Logical-to-physical implementation rules.

use super::{Operand, Rule, RuleCall, RuleError};
use crate::algebra::{supports, AlgKind, AlgNode, JoinType, KindTag};
use crate::ast::Expr;
use polystore_catalog::{Placement, ScanRoute, VerticalPart};
use polystore_core::ids::ColumnId;
use polystore_core::{Error, UnresolvedRequirement};

/// Turns a missing placement into an unsatisfiable requirement.
fn unsatisfiable(err: Error) -> RuleError {
    match err {
        Error::NoEligibleAllocation { entity, columns } => {
            RuleError::Unsatisfiable(UnresolvedRequirement::MissingColumns { entity, columns })
        }
        other => RuleError::from(other),
    }
}

/// Implements a scan once per allocation able to serve it, plus a union over disjoint
/// partitions when the rows are split. Columns split across allocations are joined on the
/// primary key.
pub struct ScanImplementationRule;

impl ScanImplementationRule {
    fn physical_scan(scan: &AlgNode, placement: &Placement) -> Result<AlgNode, RuleError> {
        let AlgKind::Scan { entity, columns } = scan.kind() else {
            return Err(RuleError::Declined);
        };
        let allocation = &placement.allocation;
        Ok(AlgNode::create(
            AlgKind::PhysicalScan {
                entity: *entity,
                allocation: allocation.id,
                adapter: allocation.adapter,
                columns: columns.clone(),
                partitions: allocation.partitions.iter().copied().collect(),
                partition_count: allocation.partitioning.partition_count,
                rank: placement.rank,
            },
            Vec::new(),
            scan.row_type().clone(),
            scan.traits().replace(placement.convention().into()),
        )?)
    }

    /// Joins the parts on the key columns each one leads with, then restores the scan's
    /// column order.
    fn vertical_join(
        call: &RuleCall<'_, '_>,
        scan: &AlgNode,
        key: &[ColumnId],
        parts: &[VerticalPart],
    ) -> Result<AlgNode, RuleError> {
        let AlgKind::Scan { entity, columns } = scan.kind() else {
            return Err(RuleError::Declined);
        };
        let logical = call.context().resolver().catalog().logical_entity(*entity)?;
        let mut joined: Option<AlgNode> = None;
        let mut offsets = Vec::with_capacity(parts.len());
        for part in parts {
            let names = logical.column_names(part.columns.iter().copied());
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let part_scan = Self::physical_scan(&AlgNode::scan(&logical, &names)?, &part.placement)?;
            joined = Some(match joined {
                None => {
                    offsets.push(0);
                    part_scan
                }
                Some(left) => {
                    let width = left.row_type().len();
                    offsets.push(width);
                    let on_key = (0..key.len())
                        .map(|i| Expr::eq(Expr::field(i), Expr::field(width + i)))
                        .collect();
                    let condition = Expr::and_all(on_key).ok_or(RuleError::Declined)?;
                    AlgNode::join(left, part_scan, JoinType::Inner, condition)?
                }
            });
        }
        let joined = joined.ok_or(RuleError::Declined)?;
        let positions = columns
            .iter()
            .map(|c| {
                parts.iter().zip(&offsets).find_map(|(part, offset)| {
                    part.columns.iter().position(|p| p == c).map(|i| offset + i)
                })
            })
            .collect::<Option<Vec<usize>>>()
            .ok_or(RuleError::Declined)?;
        Ok(AlgNode::project_fields(joined, &positions)?)
    }
}

impl Rule for ScanImplementationRule {
    fn name(&self) -> &'static str {
        "ScanImplementationRule"
    }

    fn operand(&self) -> Operand {
        Operand::logical(KindTag::Scan)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError> {
        let scan = call.rel(0);
        let AlgKind::Scan { entity, columns } = scan.kind() else {
            return Err(RuleError::Declined);
        };
        let routes = call
            .context()
            .resolver()
            .scan_routes(*entity, columns)
            .map_err(unsatisfiable)?;
        routes
            .iter()
            .map(|route| match route {
                ScanRoute::Single(placement) => Self::physical_scan(scan, placement),
                ScanRoute::Union(parts) => {
                    let scans = parts
                        .iter()
                        .map(|p| Self::physical_scan(scan, p))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(AlgNode::union_all(scans)?)
                }
                ScanRoute::Join { key, parts } => Self::vertical_join(call, scan, key, parts),
            })
            .collect()
    }
}

/// Implements a write as one physical write per allocation that must change, wrapped in a
/// fan-out when there is more than one.
pub struct ModifyImplementationRule;

impl Rule for ModifyImplementationRule {
    fn name(&self) -> &'static str {
        "ModifyImplementationRule"
    }

    fn operand(&self) -> Operand {
        Operand::logical(KindTag::Modify)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError> {
        let modify = call.rel(0);
        let AlgKind::Modify { entity, op } = modify.kind() else {
            return Err(RuleError::Declined);
        };
        let input = modify.input(0).ok_or(RuleError::Declined)?;
        let placements = call
            .context()
            .resolver()
            .eligible_for_write(*entity, op.touched_columns())
            .map_err(unsatisfiable)?;
        let writes = placements
            .iter()
            .map(|p| {
                AlgNode::create(
                    AlgKind::PhysicalModify {
                        entity: *entity,
                        allocation: p.id(),
                        adapter: p.adapter(),
                        op: op.clone(),
                    },
                    vec![input.clone()],
                    modify.row_type().clone(),
                    modify.traits().replace(p.convention().into()),
                )
            })
            .collect::<polystore_core::Result<Vec<_>>>()?;
        if writes.len() == 1 {
            return Ok(writes);
        }
        let conventions = placements.iter().map(Placement::convention).collect();
        Ok(vec![AlgNode::create(
            AlgKind::ModifyFanOut { conventions },
            writes,
            modify.row_type().clone(),
            modify.traits().clone(),
        )?])
    }
}

/// Implements any other logical operator in every offered convention able to run it.
///
/// The inputs keep their place; the planner asks for them in the chosen convention and moves
/// rows with transfers where needed. Operators whose inputs still arrive in the wrong data
/// model are left to the bridging rule first.
pub struct ImplementationRule;

impl Rule for ImplementationRule {
    fn name(&self) -> &'static str {
        "ImplementationRule"
    }

    fn operand(&self) -> Operand {
        Operand::any_logical()
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError> {
        let node = call.rel(0);
        let tag = node.kind().tag();
        if matches!(tag, KindTag::Scan | KindTag::Modify | KindTag::Subset) {
            return Err(RuleError::Declined);
        }
        let wanted = node.kind().input_model(node.data_model());
        if node.inputs().iter().any(|i| i.data_model() != wanted) {
            return Err(RuleError::Declined);
        }
        let implemented: Vec<AlgNode> = call
            .context()
            .conventions()
            .iter()
            .filter(|c| supports(**c, tag))
            .map(|c| node.with_convention(*c))
            .collect();
        if implemented.is_empty() {
            return Err(RuleError::Declined);
        }
        Ok(implemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::ModifyOp;
    use crate::rules::tests::fire_in;
    use crate::rules::RuleContext;
    use polystore_catalog::{AllocationSpec, Catalog, CatalogConfig, LogicalEntity, Partitioning};
    use polystore_core::schema::SchemaBuilder;
    use polystore_core::traits::Convention;
    use polystore_core::{DataModel, DataType};

    fn shop() -> (Catalog, LogicalEntity) {
        let catalog = Catalog::new(CatalogConfig::default());
        let ns = catalog.create_namespace("shop", DataModel::Relational).unwrap();
        let schema = SchemaBuilder::new()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("total", DataType::Float64)
            .unwrap()
            .build()
            .unwrap();
        let orders = catalog.create_logical_entity(ns, "orders", schema).unwrap();
        let entity = catalog.logical_entity(orders).unwrap();
        (catalog, entity)
    }

    fn adapter(catalog: &Catalog, name: &str, convention: Convention) -> polystore_core::ids::AdapterId {
        catalog
            .register_adapter(name, convention, &[DataModel::Relational, DataModel::Document])
            .unwrap()
    }

    #[test]
    fn test_scan_per_allocation() {
        let (catalog, orders) = shop();
        let pg = adapter(&catalog, "pg", Convention::RowStore);
        let mongo = adapter(&catalog, "mongo", Convention::DocStore);
        catalog.add_allocation(orders.id, AllocationSpec::new(pg)).unwrap();
        catalog
            .add_allocation(orders.id, AllocationSpec::new(mongo).columns(&["id"]).secondary())
            .unwrap();
        let context = RuleContext::for_catalog(&catalog);

        let scan = AlgNode::scan(&orders, &["id"]).unwrap();
        let out = fire_in(&context, &ScanImplementationRule, &scan).unwrap();
        let conventions: Vec<_> = out.iter().map(AlgNode::convention).collect();
        assert_eq!(conventions, vec![Convention::RowStore, Convention::DocStore]);
        assert!(out.iter().all(|n| n.row_type() == scan.row_type()));

        let scan = AlgNode::scan(&orders, &["id", "total"]).unwrap();
        assert_eq!(fire_in(&context, &ScanImplementationRule, &scan).unwrap().len(), 1);
    }

    #[test]
    fn test_scan_without_allocation_is_unsatisfiable() {
        let (catalog, orders) = shop();
        let context = RuleContext::for_catalog(&catalog);
        let scan = AlgNode::scan(&orders, &["total"]).unwrap();
        match fire_in(&context, &ScanImplementationRule, &scan) {
            Err(RuleError::Unsatisfiable(UnresolvedRequirement::MissingColumns { entity, columns })) => {
                assert_eq!(entity, "shop.orders");
                assert_eq!(columns, vec!["total"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_partitioned_scan_becomes_union() {
        let (catalog, orders) = shop();
        let pg = adapter(&catalog, "pg", Convention::RowStore);
        let mongo = adapter(&catalog, "mongo", Convention::DocStore);
        let partitioning = Partitioning::round_robin(2);
        catalog
            .add_allocation_group(
                orders.id,
                vec![
                    AllocationSpec::new(pg).partitioning(partitioning.clone()).partitions(&[0]),
                    AllocationSpec::new(mongo).partitioning(partitioning).partitions(&[1]),
                ],
            )
            .unwrap();
        let context = RuleContext::for_catalog(&catalog);
        let scan = AlgNode::scan(&orders, &[]).unwrap();
        let out = fire_in(&context, &ScanImplementationRule, &scan).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind().tag(), KindTag::SetOp);
        assert_eq!(out[0].convention(), Convention::Abstract);
        assert_eq!(out[0].inputs().len(), 2);
        assert_eq!(out[0].input(1).unwrap().convention(), Convention::DocStore);
    }

    #[test]
    fn test_split_columns_join_on_key() {
        let catalog = Catalog::new(CatalogConfig::default());
        let pg = adapter(&catalog, "pg", Convention::RowStore);
        let mongo = adapter(&catalog, "mongo", Convention::DocStore);
        let ns = catalog.create_namespace("shop", DataModel::Relational).unwrap();
        let schema = SchemaBuilder::new()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("total", DataType::Float64)
            .unwrap()
            .add_column("note", DataType::String)
            .unwrap()
            .add_primary_key(&["id"])
            .unwrap()
            .build()
            .unwrap();
        let invoices = catalog.create_logical_entity(ns, "invoices", schema).unwrap();
        catalog
            .add_allocation_group(
                invoices,
                vec![
                    AllocationSpec::new(pg).columns(&["id", "total"]),
                    AllocationSpec::new(mongo).columns(&["id", "note"]),
                ],
            )
            .unwrap();
        let invoices = catalog.logical_entity(invoices).unwrap();
        let context = RuleContext::for_catalog(&catalog);

        let scan = AlgNode::scan(&invoices, &["note", "total"]).unwrap();
        let out = fire_in(&context, &ScanImplementationRule, &scan).unwrap();
        assert_eq!(out.len(), 1);
        let project = &out[0];
        assert_eq!(project.kind().tag(), KindTag::Project);
        assert_eq!(project.row_type(), scan.row_type());
        match project.kind() {
            AlgKind::Project { exprs } => assert_eq!(exprs, &vec![Expr::field(3), Expr::field(1)]),
            other => panic!("unexpected kind {other}"),
        }
        let join = project.input(0).unwrap();
        match join.kind() {
            AlgKind::Join { join_type, condition } => {
                assert_eq!(*join_type, JoinType::Inner);
                assert_eq!(condition, &Expr::eq(Expr::field(0), Expr::field(2)));
            }
            other => panic!("unexpected kind {other}"),
        }
        assert_eq!(join.input(0).unwrap().convention(), Convention::RowStore);
        assert_eq!(join.input(1).unwrap().convention(), Convention::DocStore);
    }

    #[test]
    fn test_modify_fans_out_to_replicas() {
        let (catalog, orders) = shop();
        let pg = adapter(&catalog, "pg", Convention::RowStore);
        let mongo = adapter(&catalog, "mongo", Convention::DocStore);
        catalog.add_allocation(orders.id, AllocationSpec::new(pg)).unwrap();
        catalog
            .add_allocation(orders.id, AllocationSpec::new(mongo).columns(&["id"]).secondary())
            .unwrap();
        let context = RuleContext::for_catalog(&catalog);
        let rows = AlgNode::scan(&orders, &[]).unwrap();

        let total = orders.column("total").unwrap().id();
        let update = AlgNode::modify(rows.clone(), &orders, ModifyOp::Update { columns: vec![total] }).unwrap();
        let out = fire_in(&context, &ModifyImplementationRule, &update).unwrap();
        assert_eq!(out[0].kind().tag(), KindTag::PhysicalModify);
        assert_eq!(out[0].convention(), Convention::RowStore);

        let insert = AlgNode::modify(rows, &orders, ModifyOp::Insert).unwrap();
        let out = fire_in(&context, &ModifyImplementationRule, &insert).unwrap();
        match out[0].kind() {
            AlgKind::ModifyFanOut { conventions } => {
                assert_eq!(conventions, &vec![Convention::RowStore, Convention::DocStore])
            }
            other => panic!("unexpected kind {other}"),
        }
        assert_eq!(out[0].inputs().len(), 2);
    }

    #[test]
    fn test_implementation_per_supporting_convention() {
        let (catalog, orders) = shop();
        adapter(&catalog, "pg", Convention::RowStore);
        adapter(&catalog, "kv", Convention::KeyValueStore);
        let context = RuleContext::for_catalog(&catalog);
        let filter = AlgNode::filter(
            AlgNode::scan(&orders, &[]).unwrap(),
            Expr::gt(Expr::field(1), Expr::literal(10.0)),
        )
        .unwrap();
        let out = fire_in(&context, &ImplementationRule, &filter).unwrap();
        let conventions: Vec<_> = out.iter().map(AlgNode::convention).collect();
        assert_eq!(conventions, vec![Convention::RowStore, Convention::Engine]);
        // inputs are untouched: the scan is implemented separately
        assert_eq!(out[0].input(0), filter.input(0));

        let scan = AlgNode::scan(&orders, &[]).unwrap();
        assert_eq!(fire_in(&context, &ImplementationRule, &scan), Err(RuleError::Declined));
    }
}
