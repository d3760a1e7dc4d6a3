//! Integration tests: the full pipeline behind its collaborator traits.

mod mock_source;
mod pipeline;
