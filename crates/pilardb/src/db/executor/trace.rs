///
/// AccessPath
///
/// How a condition group obtained its candidate rows. Diagnostic only;
/// never consulted on the hot path.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessPath {
    /// Primary-key probe.
    IdIndex,
    /// Secondary index, by declared name.
    Index { name: &'static str },
    /// Candidates produced through a navigated relation.
    Relation,
    /// Typed scan driven by one condition.
    ConditionScan,
    /// Unconditional scan of all live rows.
    FullScan,
}

///
/// GroupTrace
///

#[derive(Clone, Copy, Debug)]
pub struct GroupTrace {
    pub access: AccessPath,
    /// Candidate rows the driver produced.
    pub candidates: usize,
    /// Rows surviving residual filtering and liveness checks.
    pub matched: usize,
}

///
/// ExecutionTrace
///
/// Per-execution report: one entry per OR group plus the final result
/// cardinality. Obtained through the repository's `trace` entry point,
/// which runs the query with reporting enabled.
///

#[derive(Clone, Debug, Default)]
pub struct ExecutionTrace {
    pub query: &'static str,
    pub groups: Vec<GroupTrace>,
    pub result_rows: usize,
}
