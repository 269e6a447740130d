//! Current model. `ensure_created` builds the store straight from these;
//! keep them in step with the `migration` package.

pub mod blogs;
pub mod posts;
