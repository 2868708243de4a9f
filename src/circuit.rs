//! Halo2 circuit and prover/verifier backend.
//!
//! The circuit proves knowledge of `(identity_nullifier, identity_trapdoor)`
//! and a Merkle path such that
//!
//! 1. `commitment = Poseidon(identity_nullifier, identity_trapdoor)`
//! 2. hashing `commitment` up the path (bits boolean-constrained, conditional
//!    swap per level) yields the public root
//! 3. `nullifier_hash = Poseidon(external_nullifier, identity_nullifier)`
//!
//! The external nullifier and signal hash are copied into the instance column,
//! which binds the proof to exactly one scope and one signal.
//!
//! Instance rows: see [`ROOT_ROW`], [`NULLIFIER_HASH_ROW`],
//! [`EXTERNAL_NULLIFIER_ROW`], [`SIGNAL_HASH_ROW`].

use crate::error::{ProtocolError, Result};
use crate::oracle::{Proof, ProofOracle, PublicInputs};
use crate::utils::FieldElement;
use crate::witness::Witness;
use halo2_gadgets::poseidon::{
    primitives::{ConstantLength, P128Pow5T3},
    Hash as PoseidonHash, Pow5Chip, Pow5Config,
};
use halo2_proofs::{
    circuit::{AssignedCell, Layouter, SimpleFloorPlanner, Value},
    plonk::{
        create_proof, keygen_pk, keygen_vk, verify_proof, Advice, Circuit, Column,
        ConstraintSystem, Error, Expression, Instance, ProvingKey, Selector, SingleVerifier,
    },
    poly::{commitment::Params, Rotation},
    transcript::{Blake2bRead, Blake2bWrite, Challenge255},
};
use log::{debug, info};
use pasta_curves::{pallas, vesta};
use rand::rngs::OsRng;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

pub const ROOT_ROW: usize = 0;
pub const NULLIFIER_HASH_ROW: usize = 1;
pub const EXTERNAL_NULLIFIER_ROW: usize = 2;
pub const SIGNAL_HASH_ROW: usize = 3;

/// Upper bound on rows used by one Poseidon invocation of the Pow5 chip.
const POSEIDON_ROWS: usize = 80;
/// Rows reserved for blinding and the private-input region.
const OVERHEAD_ROWS: usize = 16;

type Fp = pallas::Base;

#[derive(Debug, Clone)]
pub struct UniquenessConfig {
    advice: [Column<Advice>; 3],
    instance: Column<Instance>,
    swap: Selector,
    poseidon: Pow5Config<Fp, 3, 2>,
}

/// Circuit for one membership-and-nullifier statement of fixed depth.
#[derive(Debug, Clone)]
pub struct UniquenessCircuit {
    identity_nullifier: Value<Fp>,
    identity_trapdoor: Value<Fp>,
    path_indices: Vec<Value<Fp>>,
    siblings: Vec<Value<Fp>>,
    external_nullifier: Value<Fp>,
    signal_hash: Value<Fp>,
}

impl UniquenessCircuit {
    /// Shape-only circuit used for key generation.
    pub fn unknown(depth: usize) -> Self {
        Self {
            identity_nullifier: Value::unknown(),
            identity_trapdoor: Value::unknown(),
            path_indices: vec![Value::unknown(); depth],
            siblings: vec![Value::unknown(); depth],
            external_nullifier: Value::unknown(),
            signal_hash: Value::unknown(),
        }
    }

    pub fn from_witness(witness: &Witness) -> Self {
        Self {
            identity_nullifier: Value::known(witness.identity_nullifier),
            identity_trapdoor: Value::known(witness.identity_trapdoor),
            path_indices: witness
                .tree_path_indices
                .iter()
                .map(|bit| Value::known(Fp::from(u64::from(*bit))))
                .collect(),
            siblings: witness
                .tree_siblings
                .iter()
                .map(|s| Value::known(*s))
                .collect(),
            external_nullifier: Value::known(witness.external_nullifier),
            signal_hash: Value::known(witness.signal_hash),
        }
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

fn hash_pair(
    config: &UniquenessConfig,
    mut layouter: impl Layouter<Fp>,
    left: AssignedCell<Fp, Fp>,
    right: AssignedCell<Fp, Fp>,
) -> std::result::Result<AssignedCell<Fp, Fp>, Error> {
    let chip = Pow5Chip::construct(config.poseidon.clone());
    let hasher = PoseidonHash::<_, _, P128Pow5T3, ConstantLength<2>, 3, 2>::init(
        chip,
        layouter.namespace(|| "poseidon init"),
    )?;
    hasher.hash(layouter.namespace(|| "poseidon hash"), [left, right])
}

impl Circuit<Fp> for UniquenessCircuit {
    type Config = UniquenessConfig;
    type FloorPlanner = SimpleFloorPlanner;

    fn without_witnesses(&self) -> Self {
        Self::unknown(self.depth())
    }

    fn configure(meta: &mut ConstraintSystem<Fp>) -> Self::Config {
        let advice = [
            meta.advice_column(),
            meta.advice_column(),
            meta.advice_column(),
        ];
        let partial_sbox = meta.advice_column();
        let rc_a = [meta.fixed_column(), meta.fixed_column(), meta.fixed_column()];
        let rc_b = [meta.fixed_column(), meta.fixed_column(), meta.fixed_column()];
        meta.enable_constant(rc_b[0]);

        let instance = meta.instance_column();
        meta.enable_equality(instance);
        for column in advice {
            meta.enable_equality(column);
        }

        // Row 0: current, sibling, bit. Row 1: left, right.
        let swap = meta.selector();
        meta.create_gate("merkle conditional swap", |meta| {
            let s = meta.query_selector(swap);
            let current = meta.query_advice(advice[0], Rotation::cur());
            let sibling = meta.query_advice(advice[1], Rotation::cur());
            let bit = meta.query_advice(advice[2], Rotation::cur());
            let left = meta.query_advice(advice[0], Rotation::next());
            let right = meta.query_advice(advice[1], Rotation::next());
            let one = Expression::Constant(Fp::one());

            vec![
                s.clone() * bit.clone() * (one - bit.clone()),
                s.clone()
                    * (left - (current.clone() + bit.clone() * (sibling.clone() - current.clone()))),
                s * (right - (sibling.clone() + bit * (current - sibling))),
            ]
        });

        let poseidon = Pow5Chip::configure::<P128Pow5T3>(meta, advice, partial_sbox, rc_a, rc_b);

        UniquenessConfig {
            advice,
            instance,
            swap,
            poseidon,
        }
    }

    fn synthesize(
        &self,
        config: Self::Config,
        mut layouter: impl Layouter<Fp>,
    ) -> std::result::Result<(), Error> {
        let (identity_nullifier, identity_trapdoor, external_nullifier, signal_hash) = layouter
            .assign_region(
                || "load private inputs",
                |mut region| {
                    let nullifier = region.assign_advice(
                        || "identity nullifier",
                        config.advice[0],
                        0,
                        || self.identity_nullifier,
                    )?;
                    let trapdoor = region.assign_advice(
                        || "identity trapdoor",
                        config.advice[1],
                        0,
                        || self.identity_trapdoor,
                    )?;
                    let external = region.assign_advice(
                        || "external nullifier",
                        config.advice[2],
                        0,
                        || self.external_nullifier,
                    )?;
                    let signal = region.assign_advice(
                        || "signal hash",
                        config.advice[0],
                        1,
                        || self.signal_hash,
                    )?;
                    Ok((nullifier, trapdoor, external, signal))
                },
            )?;

        let mut current = hash_pair(
            &config,
            layouter.namespace(|| "identity commitment"),
            identity_nullifier.clone(),
            identity_trapdoor,
        )?;

        for (level, (bit, sibling)) in self.path_indices.iter().zip(&self.siblings).enumerate() {
            let (left, right) = layouter.assign_region(
                || format!("merkle swap {level}"),
                |mut region| {
                    config.swap.enable(&mut region, 0)?;
                    let cur = current.copy_advice(|| "current", &mut region, config.advice[0], 0)?;
                    let sib = region.assign_advice(|| "sibling", config.advice[1], 0, || *sibling)?;
                    let b = region.assign_advice(|| "path bit", config.advice[2], 0, || *bit)?;

                    let inputs = cur
                        .value()
                        .copied()
                        .zip(sib.value().copied())
                        .zip(b.value().copied());
                    let left_value = inputs.map(|((c, s), b)| if b == Fp::one() { s } else { c });
                    let right_value = inputs.map(|((c, s), b)| if b == Fp::one() { c } else { s });

                    let left =
                        region.assign_advice(|| "left", config.advice[0], 1, || left_value)?;
                    let right =
                        region.assign_advice(|| "right", config.advice[1], 1, || right_value)?;
                    Ok((left, right))
                },
            )?;

            current = hash_pair(
                &config,
                layouter.namespace(|| format!("merkle level {level}")),
                left,
                right,
            )?;
        }

        layouter.constrain_instance(current.cell(), config.instance, ROOT_ROW)?;

        let nullifier_hash = hash_pair(
            &config,
            layouter.namespace(|| "nullifier hash"),
            external_nullifier.clone(),
            identity_nullifier,
        )?;
        layouter.constrain_instance(nullifier_hash.cell(), config.instance, NULLIFIER_HASH_ROW)?;
        layouter.constrain_instance(
            external_nullifier.cell(),
            config.instance,
            EXTERNAL_NULLIFIER_ROW,
        )?;
        layouter.constrain_instance(signal_hash.cell(), config.instance, SIGNAL_HASH_ROW)?;

        Ok(())
    }
}

/// Smallest `k` whose `2^k` rows fit a circuit of the given depth.
#[must_use]
pub fn min_k(depth: u32) -> u32 {
    let rows = (depth as usize + 2) * POSEIDON_ROWS + 2 * depth as usize + OVERHEAD_ROWS;
    let mut k = 1;
    while (1usize << k) < rows {
        k += 1;
    }
    k
}

/// Halo2 (IPA over Pasta) implementation of [`ProofOracle`].
///
/// Keys are generated once for a fixed `(k, depth)` and shared behind `Arc`,
/// so clones are cheap and can be handed to worker threads.
#[derive(Clone)]
pub struct Halo2Oracle {
    k: u32,
    depth: usize,
    params: Arc<Params<vesta::Affine>>,
    pk: Arc<ProvingKey<vesta::Affine>>,
}

impl fmt::Debug for Halo2Oracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Halo2Oracle")
            .field("k", &self.k)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl Halo2Oracle {
    /// Sets up parameters and keys for trees of `depth`, using [`min_k`].
    pub fn new(depth: u32) -> Result<Self> {
        Self::with_k(min_k(depth), depth)
    }

    /// Sets up parameters and keys with an explicit `k`.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidDepth`] if `k` is too small for `depth` or key
    /// generation fails.
    pub fn with_k(k: u32, depth: u32) -> Result<Self> {
        if depth == 0 || k < min_k(depth) {
            return Err(ProtocolError::InvalidDepth(depth));
        }

        let started = Instant::now();
        let params = Params::<vesta::Affine>::new(k);
        let shape = UniquenessCircuit::unknown(depth as usize);
        let vk = keygen_vk(&params, &shape).map_err(|e| {
            debug!("Verifying key generation failed: {e:?}");
            ProtocolError::InvalidDepth(depth)
        })?;
        let pk = keygen_pk(&params, vk, &shape).map_err(|e| {
            debug!("Proving key generation failed: {e:?}");
            ProtocolError::InvalidDepth(depth)
        })?;
        info!(
            "Generated Halo2 keys for depth {depth} (k={k}) in {:?}",
            started.elapsed()
        );

        Ok(Self {
            k,
            depth: depth as usize,
            params: Arc::new(params),
            pk: Arc::new(pk),
        })
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl ProofOracle for Halo2Oracle {
    fn prove(&self, witness: &Witness) -> Result<(FieldElement, Proof)> {
        if witness.depth() != self.depth {
            return Err(ProtocolError::MalformedWitness(format!(
                "witness depth {} does not match circuit depth {}",
                witness.depth(),
                self.depth
            )));
        }
        let inputs = witness.public_inputs()?;
        let instance = inputs.to_instance();
        let circuit = UniquenessCircuit::from_witness(witness);

        let params: &Params<vesta::Affine> = &self.params;
        let pk: &ProvingKey<vesta::Affine> = &self.pk;

        let started = Instant::now();
        let mut transcript = Blake2bWrite::<_, vesta::Affine, Challenge255<_>>::init(vec![]);
        let public_inputs_slice: &[&[&[Fp]]] = &[&[&instance]];
        create_proof(
            params,
            pk,
            &[circuit],
            public_inputs_slice,
            OsRng,
            &mut transcript,
        )
        .map_err(|e| ProtocolError::MalformedWitness(format!("proof generation failed: {e:?}")))?;

        let bytes = transcript.finalize();
        debug!(
            "Generated {}-byte proof in {:?}",
            bytes.len(),
            started.elapsed()
        );
        Ok((inputs.nullifier_hash, Proof::from_bytes(bytes)))
    }

    fn verify(&self, inputs: &PublicInputs, proof: &Proof) -> Result<bool> {
        let instance = inputs.to_instance();
        let public_inputs_slice: &[&[&[Fp]]] = &[&[&instance]];
        let params: &Params<vesta::Affine> = &self.params;
        let strategy = SingleVerifier::new(params);
        let mut transcript =
            Blake2bRead::<_, vesta::Affine, Challenge255<_>>::init(proof.as_bytes());

        let result = verify_proof(
            params,
            self.pk.get_vk(),
            strategy,
            public_inputs_slice,
            &mut transcript,
        );
        Ok(result.is_ok())
    }
}
