pub mod c_emit;
pub mod classify;
pub mod ctype;
pub mod diagnostics;
pub mod functions;
pub mod header_emit;
pub mod manifest;
pub mod overrides;
pub mod param;
pub mod pipeline;
pub mod registry;
pub mod select;
pub mod size_expr;
pub mod wire;

mod util;
