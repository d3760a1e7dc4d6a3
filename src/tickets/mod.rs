//! Ticket construction: candidate combinations, vertical grouping, and
//! horizontal staking.

pub mod candidates;
pub mod horizontal;
pub mod vertical;

pub use candidates::{candidates, CandidateRules};
pub use horizontal::{HorizontalReport, HorizontalTicketBuilder, SkipReason, SkippedTicket};
pub use vertical::VerticalTicketBuilder;
