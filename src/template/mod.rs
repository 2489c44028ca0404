// SQL templates: generalizing concrete SQL and filling templates back

pub mod filler;
pub mod generalizer;
pub mod placeholder;

pub use filler::{fill_template, TemplateFiller};
pub use generalizer::{generalize_sql, truncate_statement, SqlGeneralizer};
pub use placeholder::{has_placeholders, Placeholder};
