//! Operator support per convention.
//!
//! The implementation rule only produces a physical operator in a convention that can run it.
//! Stores run scans and writes of their own allocations plus whatever they can push down; the
//! built-in engine runs every other operator but holds no data.

use super::kind::KindTag;
use polystore_core::traits::Convention;

const ROW_STORE: &[KindTag] = &[
    KindTag::Values,
    KindTag::Filter,
    KindTag::Project,
    KindTag::Join,
    KindTag::Aggregate,
    KindTag::SetOp,
    KindTag::Sort,
    KindTag::ContextSwitch,
];

const DOC_STORE: &[KindTag] = &[
    KindTag::Values,
    KindTag::Filter,
    KindTag::Project,
    KindTag::Aggregate,
    KindTag::SetOp,
    KindTag::Sort,
    KindTag::Unwind,
    KindTag::ElemMatch,
    KindTag::ContextSwitch,
];

const GRAPH_STORE: &[KindTag] = &[
    KindTag::Filter,
    KindTag::Project,
    KindTag::Sort,
    KindTag::PatternMatch,
    KindTag::ContextSwitch,
];

const VECTOR_STORE: &[KindTag] = &[KindTag::Filter, KindTag::Project, KindTag::Sort];

const ENGINE: &[KindTag] = &[
    KindTag::Values,
    KindTag::Filter,
    KindTag::Project,
    KindTag::Join,
    KindTag::Aggregate,
    KindTag::SetOp,
    KindTag::Sort,
    KindTag::Unwind,
    KindTag::ElemMatch,
    KindTag::PatternMatch,
    KindTag::ContextSwitch,
    KindTag::ModifyFanOut,
];

/// Returns true if operators of kind `tag` can run in `convention`.
pub fn supports(convention: Convention, tag: KindTag) -> bool {
    let table = match convention {
        Convention::Abstract => return false,
        Convention::RowStore => ROW_STORE,
        Convention::DocStore => DOC_STORE,
        Convention::GraphStore => GRAPH_STORE,
        Convention::KeyValueStore => &[],
        Convention::VectorStore => VECTOR_STORE,
        Convention::Engine => ENGINE,
    };
    match tag {
        KindTag::Transfer => true,
        KindTag::PhysicalScan | KindTag::PhysicalModify => convention != Convention::Engine,
        other => table.contains(&other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_runs_everything_but_storage_access() {
        assert!(supports(Convention::Engine, KindTag::Join));
        assert!(supports(Convention::Engine, KindTag::Unwind));
        assert!(!supports(Convention::Engine, KindTag::PhysicalScan));
    }

    #[test]
    fn test_store_capabilities() {
        assert!(supports(Convention::RowStore, KindTag::Join));
        assert!(!supports(Convention::RowStore, KindTag::Unwind));
        assert!(supports(Convention::DocStore, KindTag::Unwind));
        assert!(!supports(Convention::KeyValueStore, KindTag::Filter));
        assert!(supports(Convention::KeyValueStore, KindTag::PhysicalScan));
        assert!(!supports(Convention::Abstract, KindTag::Filter));
    }
}
