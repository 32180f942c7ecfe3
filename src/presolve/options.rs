/// Tuning knobs of the expansion stage.
#[derive(Clone, Debug)]
pub struct ExpansionOptions {
    /// Disables the whole stage; [`crate::expansion::expand_model`] becomes a no-op.
    pub disable_constraint_expansion: bool,
    /// Whether reservoir constraints with fixed level changes are rewritten into linear
    /// constraints over reified precedences.
    pub expand_reservoir_constraints: bool,
    /// Forces the expansion of every all-different constraint, regardless of what the usage
    /// scan concludes.
    pub expand_alldiff_constraints: bool,
    /// Enables the WCSP-style reduction of positive tables: columns whose variable occurs only
    /// in the table and in the objective are turned into per-tuple costs.
    pub detect_table_with_cost: bool,
    /// How aggressively positive tables are compressed before expansion (0 to 3).
    ///
    /// 0 disables compression, 1 and 2 use the wildcard-only compression (2 switches to the
    /// full compression for large tables), and 3 always fully compresses.
    pub table_compression_level: i32,
    /// Rewrites a linear constraint with a multi-interval right-hand side using one slack
    /// integer variable instead of one selection Boolean per interval.
    pub encode_complex_linear_constraint_with_integer: bool,
    /// Whether the main presolve loop runs after this stage. If it does not, complex
    /// right-hand sides are expanded in the first pass rather than left to
    /// [`crate::expansion::final_expansion_for_linear_constraints`].
    pub cp_model_presolve: bool,
    /// Solution enumeration forbids dropping feasible solutions, which restricts the WCSP
    /// reduction and tightens the complex-linear encoding.
    pub enumerate_all_solutions: bool,
}

impl Default for ExpansionOptions {
    fn default() -> ExpansionOptions {
        ExpansionOptions {
            disable_constraint_expansion: false,
            expand_reservoir_constraints: true,
            expand_alldiff_constraints: false,
            detect_table_with_cost: false,
            table_compression_level: 2,
            encode_complex_linear_constraint_with_integer: false,
            cp_model_presolve: true,
            enumerate_all_solutions: false,
        }
    }
}
