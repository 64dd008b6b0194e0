/// Index of the first peak in `mz` that can fall inside `[query_left, query_right]`.
///
/// `mz` must be sorted ascending and non-empty. The returned index is a
/// starting point for a forward scan: the caller still skips peaks below
/// `query_left` and stops once a peak passes `query_right`. Runs of identical
/// m/z values are always entered at their first element, so every duplicate
/// peak is visited by that scan.
///
/// Bisection stops early on an exact hit of `query_left`. Otherwise it
/// converges to two neighbours and keeps whichever is numerically closer to
/// `query_left` (the upper one on a tie), stepping past it when it still sits
/// below `query_left`. The result is the lowest index at or above
/// `query_left`, or the last index when every peak is below it.
///
/// A peak sitting exactly on `query_right` at the end of the scan is taken
/// directly, unless an earlier peak is also inside the window.
///
/// ```
/// use xicquery::find_first_match;
///
/// let mz = [99.0f32, 100.0, 100.0, 100.5, 101.0];
/// assert_eq!(find_first_match(&mz, 100.0, 100.1), 1);
/// assert_eq!(find_first_match(&mz, 100.2, 100.6), 3);
/// ```
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn find_first_match(mz: &[f32], query_left: f64, query_right: f64) -> usize {
    debug_assert!(!mz.is_empty(), "empty scans are handled by the caller");
    let at = |i: usize| mz[i] as f64;

    let mut low = 0;
    let mut high = mz.len() - 1;

    if at(low) == query_left {
        return low;
    }
    if at(high) == query_right {
        let first = walk_to_first(mz, high);
        if first == 0 || at(first - 1) < query_left {
            return first;
        }
    }

    let mut exact = None;
    while high - low > 1 {
        let mid = (low + high) / 2;
        let val = at(mid);
        if val == query_left {
            exact = Some(mid);
            break;
        }
        if val < query_left {
            low = mid;
        } else {
            high = mid;
        }
    }

    let mut candidate = match exact {
        Some(idx) => idx,
        None => {
            if (at(low) - query_left).abs() < (at(high) - query_left).abs() {
                low
            } else {
                high
            }
        }
    };
    if at(candidate) < query_left && candidate + 1 < mz.len() {
        candidate += 1;
    }
    walk_to_first(mz, candidate)
}

#[inline]
fn walk_to_first(mz: &[f32], mut idx: usize) -> usize {
    while idx > 0 && mz[idx - 1] == mz[idx] {
        idx -= 1;
    }
    idx
}
