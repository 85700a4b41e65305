use std::time::Duration;

/// Signed distance from `old` to `new` in the 32-bit sequence space.
///
/// Sequence numbers wrap, so the shorter way around the circle wins.
pub fn seq_nr_offset(new: u32, old: u32) -> i64 {
    new.wrapping_sub(old) as i32 as i64
}

#[inline(always)]
pub fn run_before_and_after_if_changed<
    'a,
    Object: 'a,
    Value: PartialEq + Copy + std::fmt::Debug + 'static,
    ChangeResult,
>(
    obj: &mut Object,
    calc: impl Fn(&Object) -> Value,
    maybe_change: impl FnOnce(&mut Object) -> ChangeResult,
    callback: impl FnOnce(&Object, &Value, &Value),
) -> ChangeResult {
    let before = calc(obj);
    let result = maybe_change(obj);
    let after = calc(obj);
    if before != after {
        callback(obj, &before, &after);
    }
    result
}

pub fn duration_ms_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.
}

/// Rounds `bytes` up to a whole number of segments.
pub fn round_up_to_segment(bytes: u32, segment_size: u32) -> u32 {
    bytes.div_ceil(segment_size).saturating_mul(segment_size)
}
