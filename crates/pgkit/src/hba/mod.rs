//! `pg_hba.conf` parsing and policy validation.

pub mod parser;
pub mod policy;

pub use parser::{AuthMethod, HbaRule};
pub use policy::{
    DEFAULT_ADMIN_ROLE, HbaPolicyResult, LOCAL_LINE, PolicyTarget, TRUST_LINE, evaluate, trust_line,
    validate_file, validate_str,
};
