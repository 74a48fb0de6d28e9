// Order-book state engine
pub mod types;   // wire-agnostic rows, patches and levels
pub mod ladder;  // one symbol's price ladder
pub mod store;   // symbol -> ladder map, atomic patch application
pub mod view;    // sorted / grouped / cumulative read views
