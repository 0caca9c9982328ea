//! Ping-pong resource naming: a pass that reads its own previous-frame output
//! (TAA history, SSR, volumetric reprojection, ...) keeps two physical resources
//! alternating under one logical base name. Grounded in `original_source`'s
//! `RenderPass::get_ping_pong_0/1`/`swap_ping_pong`.

use crate::name::Name;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn registry() -> &'static Mutex<HashMap<Name, (Name, Name, bool)>> {
    static REGISTRY: OnceLock<Mutex<HashMap<Name, (Name, Name, bool)>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn entry(base_name: Name) -> (Name, Name, bool) {
    let mut registry = registry().lock();
    *registry.entry(base_name).or_insert_with(|| {
        let even = Name::new(&format!("{base_name}__pp0"));
        let odd = Name::new(&format!("{base_name}__pp1"));
        (even, odd, false)
    })
}

/// The resource name currently selected as "this frame's write target" for
/// `base_name`.
pub fn current(base_name: Name) -> Name {
    let (even, odd, is_odd) = entry(base_name);
    if is_odd { odd } else { even }
}

/// The resource name currently selected as "last frame's output, safe to read"
/// for `base_name`.
pub fn previous(base_name: Name) -> Name {
    let (even, odd, is_odd) = entry(base_name);
    if is_odd { even } else { odd }
}

/// Flips which physical resource is "current" for `base_name`. A pass calls this
/// exactly once per frame it participates in the ping-pong, after scheduling its
/// read of `previous` and write of `current`.
pub fn swap(base_name: Name) {
    let mut registry = registry().lock();
    if let Some(slot) = registry.get_mut(&base_name) {
        slot.2 = !slot.2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_exchanges_current_and_previous() {
        let base = Name::new("ping_pong_test_base");
        let first_current = current(base);
        let first_previous = previous(base);
        assert_ne!(first_current, first_previous);
        swap(base);
        assert_eq!(current(base), first_previous);
        assert_eq!(previous(base), first_current);
    }
}
