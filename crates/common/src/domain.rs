mod reading;
mod result;
mod threshold;

pub use reading::*;
pub use result::*;
pub use threshold::*;
