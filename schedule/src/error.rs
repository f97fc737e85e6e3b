use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IR error: {source}"))]
    Ir { source: tessera_ir::Error },

    // ------------------------------------------------------------------
    // Lowering
    // ------------------------------------------------------------------
    #[snafu(display("kernel root must be a sink of stores, found {found}"))]
    InvalidKernelRoot { found: String },

    /// All reductions fused into one kernel must share input shape and axes.
    #[snafu(display("reduce over {axes:?} of {shape:?} conflicts with kernel reduce over {expected:?}"))]
    ReduceMismatch { axes: Vec<usize>, shape: Vec<String>, expected: Vec<usize> },

    #[snafu(display("store of shape {actual:?} does not match kernel output shape {expected:?}"))]
    OutputShapeMismatch { expected: Vec<String>, actual: Vec<String> },

    #[snafu(display("{what} is not supported by the linearizer"))]
    Unsupported { what: &'static str },

    // ------------------------------------------------------------------
    // Linearization invariants
    // ------------------------------------------------------------------
    #[snafu(display("instruction list does not end on the sink"))]
    MissingSink,

    #[snafu(display("scope opened at {scope} is never closed"))]
    UnclosedScope { scope: usize },

    #[snafu(display("end marker at {position} closes {scope}, which is not the innermost open scope"))]
    MisnestedScope { position: usize, scope: usize },

    #[snafu(display("accumulator at {acc} is emitted after its loop at {range}"))]
    AccumulatorAfterLoop { acc: usize, range: usize },

    #[snafu(display("instruction {position} reads {operand}, which is not emitted before it"))]
    SourceNotEmitted { position: usize, operand: usize },

    /// A node depends on two scopes that do not nest.
    #[snafu(display("node {node} sits in scopes that do not nest"))]
    ScopeConflict { node: usize },

    #[snafu(display("linearization stalled with {remaining} nodes left"))]
    Stalled { remaining: usize },

    #[snafu(display("type error at instruction {position}: {reason}"))]
    TypeCheck { position: usize, reason: String },
}
