pub mod dtype;
pub mod fileutils;
pub mod midi;
pub mod mmt_tg;
pub mod okd;
pub mod sprc;
