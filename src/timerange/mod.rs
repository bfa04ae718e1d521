//! Time range handling: expression parsing, quick ranges and captions.

mod caption;
mod natural;
mod parser;
pub mod quick_ranges;
mod zone;

pub use caption::caption;
pub use parser::{epoch_millis, TimeExpressionParser};
pub use zone::Zone;
