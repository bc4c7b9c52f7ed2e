// tests.rs
use lootbox_audit::kzg::{self, Commitment, CommitmentKey, EvaluationProof, ToxicSecret};
use lootbox_audit::{Error, FieldElement, MappingKind, Polynomial, derive_points};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn key(max_degree: usize) -> CommitmentKey {
    kzg::setup_with_toxic_secret(max_degree, ToxicSecret::new(FieldElement::from(123_456_789))).unwrap()
}

// Honest provider opens the polynomial it committed to
struct HonestProvider {
    key: CommitmentKey,
    poly: Polynomial,
    commitment: Commitment,
}

impl HonestProvider {
    fn new(key: CommitmentKey, coeffs: &[u64]) -> Self {
        let poly = Polynomial::from_u64s(coeffs).unwrap();
        let commitment = kzg::commit(&key, &poly).unwrap();
        Self { key, poly, commitment }
    }

    fn open(&self, x: u64) -> (FieldElement, EvaluationProof) {
        kzg::open(&self.key, &self.poly, &FieldElement::from(x)).unwrap()
    }

    fn verify(&self, x: u64, value: &FieldElement, proof: &EvaluationProof) -> bool {
        kzg::verify(&self.key, &self.commitment, &FieldElement::from(x), value, proof)
    }
}

// Cheating provider publishes a commitment to one polynomial but answers with another
struct CheatingProvider {
    honest: HonestProvider,
    swapped: Polynomial,
}

impl CheatingProvider {
    fn new(key: CommitmentKey, committed: &[u64], answered: &[u64]) -> Self {
        Self {
            honest: HonestProvider::new(key, committed),
            swapped: Polynomial::from_u64s(answered).unwrap(),
        }
    }

    fn open(&self, x: u64) -> (FieldElement, EvaluationProof) {
        kzg::open(&self.honest.key, &self.swapped, &FieldElement::from(x)).unwrap()
    }
}

#[test]
fn test_honest_provider() {
    // f(x) = 3 + 5x
    let provider = HonestProvider::new(key(1), &[3, 5]);
    let (y, proof) = provider.open(10);

    assert_eq!(y, FieldElement::from(53));
    assert!(provider.verify(10, &y, &proof));
    assert!(!provider.verify(10, &FieldElement::from(54), &proof));
}

#[test]
fn test_honest_provider_random_polynomial() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let key = key(16);
    let poly = Polynomial::random(16, &mut rng);
    let commitment = kzg::commit(&key, &poly).unwrap();

    for _ in 0..5 {
        let z = FieldElement::random(&mut rng);
        let (y, proof) = kzg::open(&key, &poly, &z).unwrap();
        assert_eq!(y, poly.evaluate(&z));
        assert!(kzg::verify(&key, &commitment, &z, &y, &proof));
    }
}

#[test]
fn test_cheating_provider_swapped_polynomial() {
    // Committed to 3 + 5x, answers with 3 + 6x
    let cheater = CheatingProvider::new(key(2), &[3, 5], &[3, 6]);

    for x in [1, 10, 1000] {
        let (y, proof) = cheater.open(x);
        assert!(
            !cheater.honest.verify(x, &y, &proof),
            "Swapped polynomial passed verification at {x}!"
        );
    }
}

#[test]
fn test_perturbed_coefficient_changes_commitment() {
    let original = HonestProvider::new(key(2), &[8, 7, 8]);
    let perturbed = HonestProvider::new(key(2), &[8, 7, 9]);
    assert_ne!(original.commitment, perturbed.commitment);

    // Each commitment rejects the other polynomial's openings
    let (y, proof) = original.open(4);
    assert!(original.verify(4, &y, &proof));
    assert!(!perturbed.verify(4, &y, &proof));

    let (y, proof) = perturbed.open(4);
    assert!(perturbed.verify(4, &y, &proof));
    assert!(!original.verify(4, &y, &proof));
}

#[test]
fn test_cached_proof_reused_at_other_point() {
    let provider = HonestProvider::new(key(3), &[1, 2, 3, 4]);
    let (y, proof) = provider.open(5);

    // The cached proof does not vouch for a different challenge point
    assert!(!provider.verify(6, &y, &proof));
    let (y6, _) = provider.open(6);
    assert!(!provider.verify(6, &y6, &proof));
}

#[test]
fn test_degree_exceeding_key_is_rejected() {
    let key = key(2);
    let poly = Polynomial::from_u64s(&[1, 1, 1, 1]).unwrap();

    assert!(matches!(
        kzg::commit(&key, &poly),
        Err(Error::DegreeExceedsKey { degree: 3, max_degree: 2 })
    ));
    assert!(matches!(
        kzg::open(&key, &poly, &FieldElement::ONE),
        Err(Error::DegreeExceedsKey { .. })
    ));
}

#[test]
fn test_published_text_verifies() {
    let provider = HonestProvider::new(key(2), &[8, 7, 8]);
    let (y, proof) = provider.open(3);

    // What an auditor reads back from the board
    let key = CommitmentKey::from_text(&provider.key.to_text()).unwrap();
    let commitment: Commitment = provider.commitment.to_string().parse().unwrap();
    let proof: EvaluationProof = proof.to_string().parse().unwrap();
    let y: FieldElement = y.to_string().parse().unwrap();

    assert_eq!(y, FieldElement::from(8 + 7 * 3 + 8 * 9));
    assert!(kzg::verify(&key, &commitment, &FieldElement::from(3), &y, &proof));
}

#[test]
fn test_points_are_reproducible_from_seed() {
    let seed = [42u8; 32];
    let kinds = [
        MappingKind::Direct,
        MappingKind::LootBox {
            offers: vec!["gem".into(), "coin".into()],
        },
    ];
    for kind in &kinds {
        let provider_points = derive_points(kind, &seed, 20);
        let auditor_points = derive_points(kind, &seed, 20);
        assert_eq!(provider_points, auditor_points);

        let other = derive_points(kind, &[43u8; 32], 20);
        assert_ne!(provider_points, other);
    }
}
