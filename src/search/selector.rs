use rand::Rng;

/// Only the top results are eligible for direct delivery.
pub const MAX_SELECTION_WINDOW: usize = 10;

fn window_index(draw: f64, window: usize) -> usize {
    let index = ((draw * window as f64).ceil() as usize).saturating_sub(1);
    index.min(window - 1)
}

/// Picks one candidate uniformly from the first `min(len, 10)` entries.
/// Every call draws independently, so repeated calls may return the same URL.
pub fn pick_random<'a, R>(candidates: &'a [String], rng: &mut R) -> Option<&'a str>
where
    R: Rng + ?Sized,
{
    if candidates.is_empty() {
        return None;
    }
    let window = candidates.len().min(MAX_SELECTION_WINDOW);
    let draw: f64 = rng.gen();
    candidates
        .get(window_index(draw, window))
        .map(String::as_str)
}
