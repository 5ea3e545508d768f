pub mod controls;
pub mod datatable;
pub mod debug;
pub mod line_input;
pub mod stats;
