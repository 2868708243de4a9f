use pasta_curves::pallas;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zkp_uniqueness::{
    ethereum::address_to_signal,
    gateway::VerificationGateway,
    group::{GroupStore, MembershipWitnessProvider, TimeoutProvider},
    merkle::MembershipWitness,
    hasher::hash_to_field,
    identity::Identity,
    nullifier::{build_external_nullifier, compute_nullifier_hash},
    oracle::{MockProofOracle, Proof, ProofOracle, PublicInputs, TimeoutOracle},
    store::{FileNullifierStore, MemoryNullifierStore, NullifierStore},
    witness::{assemble, Witness},
    ProtocolError, VerificationContext,
};

const GROUP: u64 = 1;
const DEPTH: u32 = 20;
const APP_ID: &str = "app_1234";
const ACTION: &str = "wid_test_1234";
const SIGNAL_ADDRESS: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

type MockGateway<S = MemoryNullifierStore> =
    VerificationGateway<Arc<GroupStore>, Arc<MockProofOracle>, S>;

struct Deployment {
    groups: Arc<GroupStore>,
    oracle: Arc<MockProofOracle>,
}

impl Deployment {
    fn new(members: &[&Identity]) -> Self {
        let commitments: Vec<_> = members.iter().map(|m| m.commitment()).collect();
        Self {
            groups: Arc::new(
                GroupStore::with_members(GROUP, DEPTH, pallas::Base::zero(), &commitments)
                    .unwrap(),
            ),
            oracle: Arc::new(MockProofOracle::new()),
        }
    }

    fn root(&self) -> pallas::Base {
        self.groups.root(GROUP).unwrap()
    }

    fn witness(&self, identity: &Identity, context: &VerificationContext, signal: &[u8]) -> Witness {
        let membership = self.groups.prove(GROUP, identity.commitment()).unwrap();
        assemble(
            identity,
            &membership,
            DEPTH,
            context.external_nullifier().unwrap(),
            signal,
        )
        .unwrap()
    }

    fn prove(
        &self,
        identity: &Identity,
        context: &VerificationContext,
        signal: &[u8],
    ) -> (pallas::Base, Proof) {
        self.oracle
            .prove(&self.witness(identity, context, signal))
            .unwrap()
    }

    fn gateway(&self, context: VerificationContext) -> MockGateway {
        self.gateway_with_store(context, MemoryNullifierStore::new())
    }

    fn gateway_with_store<S: NullifierStore>(
        &self,
        context: VerificationContext,
        store: S,
    ) -> MockGateway<S> {
        VerificationGateway::new(
            context,
            GROUP,
            Arc::clone(&self.groups),
            Arc::clone(&self.oracle),
            store,
        )
        .unwrap()
    }
}

fn context() -> VerificationContext {
    VerificationContext::new(APP_ID, ACTION)
}

fn signal() -> [u8; 20] {
    address_to_signal(SIGNAL_ADDRESS).unwrap()
}

#[test]
fn test_end_to_end_scenario() {
    let identity = Identity::from_message("scenario identity").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();
    let (nullifier_hash, proof) = deployment.prove(&identity, &context(), &signal());

    let gateway = deployment.gateway(context());
    let accepted = gateway
        .verify_and_record(root, nullifier_hash, &signal(), &proof)
        .unwrap();
    assert_eq!(accepted.nullifier_hash, nullifier_hash);

    let again = gateway.verify_and_record(root, nullifier_hash, &signal(), &proof);
    assert!(matches!(again, Err(ProtocolError::DuplicateNullifier)));
}

#[test]
fn test_nullifier_hash_is_deterministic() {
    let identity = Identity::from_message("deterministic").unwrap();
    let deployment = Deployment::new(&[&identity]);

    let (a, proof_a) = deployment.prove(&identity, &context(), &signal());
    let (b, proof_b) = deployment.prove(&identity, &context(), b"another signal");
    assert_eq!(a, b);
    assert_ne!(proof_a, proof_b);

    let expected = compute_nullifier_hash(
        identity.nullifier(),
        build_external_nullifier(APP_ID, ACTION).unwrap(),
    );
    assert_eq!(a, expected);
}

#[test]
fn test_actions_are_unlinkable() {
    let identity = Identity::from_message("unlinkable").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();

    let first = VerificationContext::new(APP_ID, "vote_1");
    let second = VerificationContext::new(APP_ID, "vote_2");
    let other_app = VerificationContext::new("app_5678", "vote_1");

    let (h1, p1) = deployment.prove(&identity, &first, &signal());
    let (h2, p2) = deployment.prove(&identity, &second, &signal());
    let (h3, p3) = deployment.prove(&identity, &other_app, &signal());
    assert_ne!(h1, h2);
    assert_ne!(h1, h3);
    assert_ne!(h2, h3);

    // Each action accepts the same identity once.
    deployment
        .gateway(first)
        .verify_and_record(root, h1, &signal(), &p1)
        .unwrap();
    deployment
        .gateway(second)
        .verify_and_record(root, h2, &signal(), &p2)
        .unwrap();
    deployment
        .gateway(other_app)
        .verify_and_record(root, h3, &signal(), &p3)
        .unwrap();
}

#[test]
fn test_distinct_identities_distinct_nullifiers() {
    let alice = Identity::from_message("alice").unwrap();
    let bob = Identity::from_message("bob").unwrap();
    let deployment = Deployment::new(&[&alice, &bob]);
    let root = deployment.root();
    let gateway = deployment.gateway(context());

    let (ha, pa) = deployment.prove(&alice, &context(), &signal());
    let (hb, pb) = deployment.prove(&bob, &context(), &signal());
    assert_ne!(ha, hb);

    gateway.verify_and_record(root, ha, &signal(), &pa).unwrap();
    gateway.verify_and_record(root, hb, &signal(), &pb).unwrap();
    assert!(gateway.is_spent(ha).unwrap());
    assert!(gateway.is_spent(hb).unwrap());
}

#[test]
fn test_fresh_proof_is_still_a_replay() {
    let identity = Identity::from_message("replayer").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();
    let gateway = deployment.gateway(context());

    let (h, p) = deployment.prove(&identity, &context(), &signal());
    gateway.verify_and_record(root, h, &signal(), &p).unwrap();

    let (h2, p2) = deployment.prove(&identity, &context(), b"different signal");
    assert!(matches!(
        gateway.verify_and_record(root, h2, b"different signal", &p2),
        Err(ProtocolError::DuplicateNullifier)
    ));
}

#[test]
fn test_non_member_rejected() {
    let member = Identity::from_message("member").unwrap();
    let outsider = Identity::from_message("outsider").unwrap();
    let deployment = Deployment::new(&[&member]);
    let root = deployment.root();

    assert!(matches!(
        deployment.groups.prove(GROUP, outsider.commitment()),
        Err(ProtocolError::NotAMember(_))
    ));

    let forged = deployment.groups.prove(GROUP, member.commitment()).unwrap();
    let witness = assemble(
        &outsider,
        &forged,
        DEPTH,
        context().external_nullifier().unwrap(),
        &signal(),
    )
    .unwrap();
    let (h, p) = deployment.oracle.prove(&witness).unwrap();

    let gateway = deployment.gateway(context());
    assert!(matches!(
        gateway.verify_and_record(root, h, &signal(), &p),
        Err(ProtocolError::InvalidProof)
    ));
    assert!(!gateway.is_spent(h).unwrap());
}

#[test]
fn test_any_flipped_proof_bit_rejected() {
    let identity = Identity::from_message("bit flips").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();
    let gateway = deployment.gateway(context());
    let (h, proof) = deployment.prove(&identity, &context(), &signal());

    let bytes = proof.as_bytes().to_vec();
    for byte in 0..bytes.len() {
        for bit in 0..8 {
            let mut flipped = bytes.clone();
            flipped[byte] ^= 1 << bit;
            let result =
                gateway.verify_and_record(root, h, &signal(), &Proof::from_bytes(flipped));
            assert!(
                matches!(result, Err(ProtocolError::InvalidProof)),
                "flip of byte {byte} bit {bit} was not rejected"
            );
        }
    }

    assert!(!gateway.is_spent(h).unwrap());
    gateway.verify_and_record(root, h, &signal(), &proof).unwrap();
}

#[test]
fn test_signal_is_bound() {
    let identity = Identity::from_message("signal binding").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();
    let gateway = deployment.gateway(context());
    let (h, p) = deployment.prove(&identity, &context(), &signal());

    let other = address_to_signal("0x1111111111111111111111111111111111111111").unwrap();
    assert!(matches!(
        gateway.verify_and_record(root, h, &other, &p),
        Err(ProtocolError::InvalidProof)
    ));
    gateway.verify_and_record(root, h, &signal(), &p).unwrap();
}

#[test]
fn test_stale_root_rejected() {
    let identity = Identity::from_message("stale").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let old_root = deployment.root();
    let (h, p) = deployment.prove(&identity, &context(), &signal());

    deployment
        .groups
        .add_member(GROUP, Identity::from_message("late joiner").unwrap().commitment())
        .unwrap();
    let new_root = deployment.root();
    assert_ne!(old_root, new_root);

    let gateway = deployment.gateway(context());
    assert!(matches!(
        gateway.verify_and_record(old_root, h, &signal(), &p),
        Err(ProtocolError::InvalidProof)
    ));
    assert!(matches!(
        gateway.verify_and_record(new_root, h, &signal(), &p),
        Err(ProtocolError::InvalidProof)
    ));
    assert!(!gateway.is_spent(h).unwrap());

    // A proof rebuilt against the current root is accepted.
    let (h2, p2) = deployment.prove(&identity, &context(), &signal());
    assert_eq!(h, h2);
    gateway.verify_and_record(new_root, h2, &signal(), &p2).unwrap();
}

#[test]
fn test_root_of_private_tree_rejected() {
    let member = Identity::from_message("member").unwrap();
    let outsider = Identity::from_message("outsider").unwrap();
    let deployment = Deployment::new(&[&member]);

    // The outsider builds a tree holding only their own commitment.
    let own_tree =
        GroupStore::with_members(GROUP, DEPTH, pallas::Base::zero(), &[outsider.commitment()])
            .unwrap();
    let own_root = own_tree.root(GROUP).unwrap();
    let membership: MembershipWitness = own_tree.prove(GROUP, outsider.commitment()).unwrap();
    let witness = assemble(
        &outsider,
        &membership,
        DEPTH,
        context().external_nullifier().unwrap(),
        &signal(),
    )
    .unwrap();
    let (h, p) = deployment.oracle.prove(&witness).unwrap();
    // The proof itself is sound for the private root.
    assert!(deployment
        .oracle
        .verify(&witness.public_inputs().unwrap(), &p)
        .unwrap());

    let gateway = deployment.gateway(context());
    assert!(matches!(
        gateway.verify_and_record(own_root, h, &signal(), &p),
        Err(ProtocolError::InvalidProof)
    ));
    assert!(!gateway.is_spent(h).unwrap());
}

struct StalledRoots;

impl MembershipWitnessProvider for StalledRoots {
    fn prove(
        &self,
        group_id: u64,
        _commitment: pallas::Base,
    ) -> zkp_uniqueness::error::Result<MembershipWitness> {
        Err(ProtocolError::NotAMember(group_id))
    }

    fn root(&self, _group_id: u64) -> zkp_uniqueness::error::Result<pallas::Base> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(pallas::Base::zero())
    }
}

#[test]
fn test_provider_timeout_records_nothing() {
    let identity = Identity::from_message("provider outage").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let (h, p) = deployment.prove(&identity, &context(), &signal());

    let gateway = VerificationGateway::new(
        context(),
        GROUP,
        TimeoutProvider::new(StalledRoots, Duration::from_millis(20)),
        Arc::clone(&deployment.oracle),
        MemoryNullifierStore::new(),
    )
    .unwrap();

    let err = gateway
        .verify_and_record(deployment.root(), h, &signal(), &p)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ExternalServiceUnavailable(_)));
    assert!(err.is_retryable());
    assert!(gateway.store().is_empty());
}

#[test]
fn test_concurrent_identical_requests_accept_once() {
    let identity = Identity::from_message("racer").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();
    let gateway = deployment.gateway(context());
    let (h, p) = deployment.prove(&identity, &context(), &signal());

    let accepted = AtomicUsize::new(0);
    let duplicates = AtomicUsize::new(0);
    std::thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| match gateway.verify_and_record(root, h, &signal(), &p) {
                Ok(_) => {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
                Err(ProtocolError::DuplicateNullifier) => {
                    duplicates.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => panic!("unexpected error: {e}"),
            });
        }
    });

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(duplicates.load(Ordering::SeqCst), 15);
}

#[test]
fn test_concurrent_distinct_identities_all_accepted() {
    let identities: Vec<Identity> = (0..8)
        .map(|i| Identity::from_message(&format!("parallel-{i}")).unwrap())
        .collect();
    let refs: Vec<&Identity> = identities.iter().collect();
    let deployment = Deployment::new(&refs);
    let root = deployment.root();
    let gateway = deployment.gateway(context());

    let proofs: Vec<_> = identities
        .iter()
        .map(|id| deployment.prove(id, &context(), &signal()))
        .collect();

    std::thread::scope(|s| {
        for (h, p) in &proofs {
            let gateway = &gateway;
            s.spawn(move || {
                gateway.verify_and_record(root, *h, &signal(), p).unwrap();
            });
        }
    });

    assert_eq!(gateway.store().len(), identities.len());
}

struct StalledOracle;

impl ProofOracle for StalledOracle {
    fn prove(&self, _witness: &Witness) -> zkp_uniqueness::error::Result<(pallas::Base, Proof)> {
        Err(ProtocolError::ExternalServiceUnavailable("not used".to_string()))
    }

    fn verify(&self, _inputs: &PublicInputs, _proof: &Proof) -> zkp_uniqueness::error::Result<bool> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(true)
    }
}

#[test]
fn test_oracle_timeout_records_nothing() {
    let identity = Identity::from_message("oracle outage").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let (h, p) = deployment.prove(&identity, &context(), &signal());

    let gateway = VerificationGateway::new(
        context(),
        GROUP,
        Arc::clone(&deployment.groups),
        TimeoutOracle::new(StalledOracle, Duration::from_millis(20)),
        MemoryNullifierStore::new(),
    )
    .unwrap();

    match gateway.verify_and_record(deployment.root(), h, &signal(), &p) {
        Err(e) => {
            assert!(matches!(e, ProtocolError::ExternalServiceUnavailable(_)));
            assert!(e.is_retryable());
        }
        Ok(_) => panic!("timed-out verification must not be accepted"),
    }
    assert!(!gateway.is_spent(h).unwrap());
}

#[test]
fn test_spent_set_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nullifiers.txt");
    let identity = Identity::from_message("persistent").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();
    let (h, p) = deployment.prove(&identity, &context(), &signal());

    {
        let gateway =
            deployment.gateway_with_store(context(), FileNullifierStore::open(&path).unwrap());
        gateway.verify_and_record(root, h, &signal(), &p).unwrap();
    }

    let reopened = FileNullifierStore::open(&path).unwrap();
    assert!(reopened
        .contains(context().id().unwrap(), h)
        .unwrap());
    let gateway = deployment.gateway_with_store(context(), reopened);
    assert!(matches!(
        gateway.verify_and_record(root, h, &signal(), &p),
        Err(ProtocolError::DuplicateNullifier)
    ));
}

#[test]
fn test_duplicate_check_skips_oracle() {
    struct CountingOracle {
        inner: MockProofOracle,
        verifications: AtomicUsize,
    }

    impl ProofOracle for CountingOracle {
        fn prove(&self, witness: &Witness) -> zkp_uniqueness::error::Result<(pallas::Base, Proof)> {
            self.inner.prove(witness)
        }

        fn verify(&self, inputs: &PublicInputs, proof: &Proof) -> zkp_uniqueness::error::Result<bool> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(inputs, proof)
        }
    }

    let identity = Identity::from_message("counted").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let root = deployment.root();
    let oracle = CountingOracle {
        inner: MockProofOracle::with_key([9u8; 32]),
        verifications: AtomicUsize::new(0),
    };
    let (h, p) = oracle
        .prove(&deployment.witness(&identity, &context(), &signal()))
        .unwrap();

    let gateway = VerificationGateway::new(
        context(),
        GROUP,
        Arc::clone(&deployment.groups),
        oracle,
        MemoryNullifierStore::new(),
    )
    .unwrap();
    gateway.verify_and_record(root, h, &signal(), &p).unwrap();
    let _ = gateway.verify_and_record(root, h, &signal(), &p);
    assert_eq!(gateway.oracle().verifications.load(Ordering::SeqCst), 1);
}

#[test]
fn test_signal_hash_matches_witness() {
    let identity = Identity::from_message("signal hash").unwrap();
    let deployment = Deployment::new(&[&identity]);
    let witness = deployment.witness(&identity, &context(), &signal());
    assert_eq!(witness.signal_hash, hash_to_field(&signal()));
    assert_eq!(witness.depth(), DEPTH as usize);
}
