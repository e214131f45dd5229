pub mod stage0_group_lines;
pub mod stage1_extract_tags;
pub mod stage2_aggregate;
pub mod stage3_filter;
pub mod stage4_render;

pub use stage0_group_lines::*;
pub use stage1_extract_tags::*;
pub use stage2_aggregate::*;
pub use stage3_filter::*;
pub use stage4_render::*;
