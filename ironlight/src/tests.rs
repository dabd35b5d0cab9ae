/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::cache::CacheRawAPI;
use crate::compute_hash;
use crate::BlockTemplate;
use crate::Cache;
use crate::CancelToken;
use crate::MineOutcome;
use crate::MinerConfig;
use crate::Mode;
use crate::RandomXContext;
use crate::RandomXFlags;
use crate::RandomXVM;
use crate::ResultHash;
use crate::Stage;

const TEST_KEY: &[u8] = b"test key 000";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Light context for `"test key 000"`, built once per test binary.
pub(crate) fn test_context() -> &'static RandomXContext {
    static CONTEXT: OnceLock<RandomXContext> = OnceLock::new();

    CONTEXT.get_or_init(|| {
        init_tracing();
        RandomXContext::with_options(TEST_KEY, RandomXFlags::default(), 2, &mut |_| {}).unwrap()
    })
}

pub(crate) fn test_cache() -> &'static Cache {
    test_context().cache()
}

fn hex_hash(hash: ResultHash) -> String {
    hex::encode(hash.into_slice())
}

#[test]
fn light_mode_matches_reference_vectors() {
    let mut vm = RandomXVM::light(test_cache().handle(), RandomXFlags::default()).unwrap();

    let vectors: [(&[u8], &str); 3] = [
        (
            b"This is a test",
            "639183aae1bf4c9a35884cb46b09cad9175f04efd7684e7262a0ac1c2f0b4e3f",
        ),
        (
            b"Lorem ipsum dolor sit amet",
            "300a0adb47603dedb42228ccb2b211104f4da45af709cd7547cd049e9489c969",
        ),
        (
            b"sed do eiusmod tempor incididunt ut labore et dolore magna aliqua",
            "c36d4ed4191e617309867ed66a443be4075014e2b061bcdaf9ce7b721d2b77a8",
        ),
    ];

    for (input, expected) in vectors {
        assert_eq!(hex_hash(vm.hash(input)), expected);
    }
}

#[test]
fn second_key_matches_reference_vectors() {
    init_tracing();
    let context = RandomXContext::with_options(b"test key 001", RandomXFlags::default(), 2, &mut |_| {})
        .unwrap();

    let hash = compute_hash(
        &context,
        b"sed do eiusmod tempor incididunt ut labore et dolore magna aliqua",
    )
    .unwrap();
    assert_eq!(
        hex_hash(hash),
        "e9ff4503201c0c2cca26d285c93ae883f9b1d30c9eb240b820756f2d5a7905fc"
    );

    let block = hex::decode(
        "0b0b98bea7e805e0010a2126d287a2a0cc833d312cb786385a7c2f9de69d25537f584a9bc9977b00000000666fd8753bf61a8631f12984e3fd44f4014eca629276817b56f32e9b68bd82f416",
    )
    .unwrap();
    let hash = compute_hash(&context, &block).unwrap();
    assert_eq!(
        hex_hash(hash),
        "c56414121acda1713c2f2a819d8ae38aed7c80c35c2a769298d34f03833cd5f1"
    );
}

#[test]
fn compute_hash_is_deterministic_and_input_sensitive() {
    let context = test_context();
    let input = b"deterministic input".to_vec();

    let first = compute_hash(context, &input).unwrap();
    let second = compute_hash(context, &input).unwrap();
    assert_eq!(first, second);

    let mut flipped = input;
    flipped[3] ^= 0x10;
    assert_ne!(compute_hash(context, &flipped).unwrap(), first);
}

#[test]
fn cache_builds_are_repeatable() {
    let cache = Cache::new(TEST_KEY, RandomXFlags::default()).unwrap();
    let shared = test_cache().raw();

    assert_eq!(cache.raw().word(0), shared.word(0));
    assert_eq!(cache.raw().word(12_345_678), shared.word(12_345_678));
    assert_eq!(
        cache.raw().programs().reciprocals(),
        shared.programs().reciprocals()
    );
}

#[test]
fn cache_progress_covers_every_stage() {
    let mut stages = Vec::new();
    Cache::with_progress(b"progress key", RandomXFlags::default(), &mut |progress| {
        stages.push((progress.stage, progress.percent))
    })
    .unwrap();

    assert_eq!(stages.first(), Some(&(Stage::Cache, 8)));
    assert!(stages.contains(&(Stage::Cache, 100)));
    assert_eq!(stages.last(), Some(&(Stage::Programs, 100)));
}

#[test]
fn light_mining_is_independent_of_worker_count() {
    let template = BlockTemplate::from_hashing_blob(vec![0x10; 76]).unwrap();
    let cancel = CancelToken::new();

    let mut outcomes = Vec::new();
    for workers in [1, 3] {
        let miner = crate::Miner::new(MinerConfig::with_workers(workers)).unwrap();
        let job =
            crate::MiningJob::new(template.clone(), 100..=163, 8, cancel.current()).unwrap();

        let outcome = miner
            .mine(
                &job,
                |_| test_context().create_vm(),
                &cancel,
                &mut |_| {},
                &mut |_| {},
            )
            .unwrap();
        outcomes.push(outcome);
    }

    assert_eq!(outcomes[0], outcomes[1]);
    if let MineOutcome::Found(share) = &outcomes[0] {
        let hash = compute_hash(test_context(), &template.with_nonce(share.nonce)).unwrap();
        assert_eq!(hash, share.hash);
        assert!(hash.meets_difficulty(8));
    }
}

#[test]
fn context_mine_reports_the_share() {
    let template = BlockTemplate::new(vec![0x42; 43], 39).unwrap();
    let cancel = CancelToken::new();
    let mut shares = Vec::new();

    let outcome = test_context()
        .mine(
            &template,
            0..=63,
            2,
            &mut |share| shares.push(share.clone()),
            &mut |_| {},
            &cancel,
        )
        .unwrap();

    match outcome {
        MineOutcome::Found(share) => assert_eq!(shares, vec![share]),
        MineOutcome::Exhausted => assert!(shares.is_empty()),
        MineOutcome::Cancelled => panic!("nothing cancelled the job"),
    }
}

#[test]
#[ignore = "builds the full 2 GiB dataset"]
fn full_mode_matches_light_mode() {
    init_tracing();
    let context = crate::initialize_context(TEST_KEY, Mode::Full).unwrap();
    assert_eq!(context.mode(), Mode::Full);

    let input = b"This is a test";
    let full = compute_hash(&context, input).unwrap();
    let light = compute_hash(test_context(), input).unwrap();

    assert_eq!(full, light);
    assert_eq!(
        hex_hash(full),
        "639183aae1bf4c9a35884cb46b09cad9175f04efd7684e7262a0ac1c2f0b4e3f"
    );
}
