//! Platform layer: memory mapping, process control and CPU placement.

pub mod linux;

pub use linux::{
    Forked, LinuxMemoryConfig, attach_segment_mmap, create_segment_mmap, current_cpu,
    fork_process, get_current_pid, is_process_alive, map_anonymous_shared,
    pin_to_cpu, terminate_process, unmap_anonymous, wait_for_child,
};
