pub mod classification;
pub mod consensus;
pub mod observation;
pub mod word;

pub use classification::*;
pub use consensus::*;
pub use observation::*;
pub use word::*;
