//! Gestalt (Ratcliff/Obershelp) string similarity.
//!
//! The ratio is `2 * M / T`, where `T` is the combined length of both strings
//! and `M` the number of characters in matching blocks, scored the same way
//! as Python's `difflib.SequenceMatcher`.

use difflib::sequencematcher::SequenceMatcher;

/// Similarity in `[0, 1]`; two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut matcher = SequenceMatcher::new(a, b);
    f64::from(matcher.ratio())
}

/// The candidate most similar to `target`, with its score. No minimum score
/// is applied. Ties go to the lexicographically greatest candidate.
pub fn closest<'a, I>(target: &str, candidates: I) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|candidate| (candidate, ratio(candidate, target)))
        .fold(None, |best: Option<(&'a str, f64)>, (candidate, score)| match best {
            Some((best_candidate, best_score))
                if best_score > score || (best_score == score && best_candidate >= candidate) =>
            {
                Some((best_candidate, best_score))
            }
            _ => Some((candidate, score)),
        })
}
