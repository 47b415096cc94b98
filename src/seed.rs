//! Demo inventory generator.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::backend::ProductStore;
use crate::error::StoreError;
use crate::schema::{Category, ProductDraft};

/// Number of products `inventory seed` inserts when no count is given.
pub const DEFAULT_SEED_COUNT: usize = 20;

pub const COLORS: [&str; 7] = ["red", "blue", "green", "black", "white", "orange", "purple"];

const WORDS: &[&str] = &[
    "amber", "anchor", "arrow", "atlas", "birch", "blaze", "breeze", "canyon", "cedar", "comet",
    "coral", "crest", "delta", "ember", "falcon", "fern", "flint", "frost", "glade", "harbor",
    "hazel", "horizon", "iris", "ivory", "jade", "juniper", "lagoon", "lantern", "maple",
    "meadow", "mesa", "nova", "oak", "orbit", "pebble", "pine", "prairie", "quartz", "raven",
    "ridge", "river", "sable", "sage", "sierra", "slate", "spruce", "summit", "thistle", "tide",
    "timber", "vale", "willow", "zephyr",
];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn pick<'a, R: Rng + ?Sized>(items: &[&'a str], rng: &mut R) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

/// One random product: a two-word capitalized name, uniform category and
/// color, quantity in `1..=100`, price in `5.00..=500.00` rounded to cents.
pub fn random_draft<R: Rng + ?Sized>(rng: &mut R) -> ProductDraft {
    let name = format!(
        "{} {}",
        capitalize(pick(WORDS, rng)),
        capitalize(pick(WORDS, rng))
    );
    let category = Category::ALL[rng.gen_range(0..Category::ALL.len())];
    let price: f64 = rng.gen_range(5.0..=500.0);

    ProductDraft {
        name,
        category,
        color: pick(&COLORS, rng).to_string(),
        quantity: rng.gen_range(1..=100),
        price: (price * 100.0).round() / 100.0,
    }
}

/// Insert `count` random products and return their ids.
pub fn seed_products<R: Rng + ?Sized>(
    store: &ProductStore,
    count: usize,
    rng: &mut R,
) -> Result<Vec<i64>, StoreError> {
    let ids = (0..count)
        .map(|_| store.create(&random_draft(rng)))
        .collect::<Result<Vec<_>, _>>()?;
    info!(count = ids.len(), "Seeded inventory");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_random_draft_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let draft = random_draft(&mut rng);

            let words: Vec<&str> = draft.name.split(' ').collect();
            assert_eq!(words.len(), 2);
            assert!(words.iter().all(|w| w.chars().next().unwrap().is_uppercase()));

            assert!(COLORS.contains(&draft.color.as_str()));
            assert!((1..=100).contains(&draft.quantity));
            assert!((5.0..=500.0).contains(&draft.price));
            assert_eq!((draft.price * 100.0).round() / 100.0, draft.price);
        }
    }

    #[test]
    fn test_same_seed_same_inventory() {
        let a = random_draft(&mut StdRng::seed_from_u64(42));
        let b = random_draft(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_seed_products_inserts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::init_db(&dir.path().join("inventory.db")).unwrap();
        let store = db.connect().unwrap();

        let ids = seed_products(&store, DEFAULT_SEED_COUNT, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(ids.len(), DEFAULT_SEED_COUNT);
        assert_eq!(store.count().unwrap(), DEFAULT_SEED_COUNT as i64);
        assert_eq!(ids, (1..=DEFAULT_SEED_COUNT as i64).collect::<Vec<_>>());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("oak"), "Oak");
        assert_eq!(capitalize(""), "");
    }
}
