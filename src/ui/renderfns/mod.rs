pub mod footer;
pub mod header;
pub mod query_state;
pub mod utils;

pub use footer::draw_footer;
pub use header::draw_header;
pub use query_state::draw_query_placeholder;
pub use utils::{format_age, truncate};
