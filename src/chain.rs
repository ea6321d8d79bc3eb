// Copyright (C) 2019  Braiins Systems s.r.o.
//
// This file is part of Braiins Open-Source Initiative (BOSI).
//
// BOSI is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// Please, keep in mind that we may also license BOSI or any part thereof
// under a proprietary license. For more information on the terms and conditions
// of such proprietary license or if you have any other questions, please
// contact us at opensource@braiins.com.

//! Job protocol between the host and one chip on the chain.
//!
//! A candidate block is 123 bytes: `header ∥ random(32) ∥ seed ∥ random(32)`.
//! The first 64 bytes are a full compression block, so the host precomputes
//! midstates over them and the chip only sweeps the 59-byte tail. Four
//! midstates are submitted at once, covering a window of four adjacent
//! `expires` values; the chip reports which one produced the winning nonce.

use crate::error::{self, Frame as FrameError, Job as JobError};
use crate::sha256;
use crate::uart::{Bus, TYPE_CHAIN};

use tracing::debug;

use std::convert::TryInto;
use std::time::{Duration, Instant};

/// Job submission opcode
pub const JOB_OPCODE: u8 = 0x8C;

/// Job status query opcode
pub const STATUS_OPCODE: u8 = 0x9A;

/// Candidate block size
pub const BLOCK_SIZE: usize = 123;

/// Size of the fixed part covered by midstates
pub const PREFIX_SIZE: usize = 64;

/// Size of the mutable tail searched by the chip
pub const SUFFIX_SIZE: usize = BLOCK_SIZE - PREFIX_SIZE;

/// Number of `expires` variants hashed simultaneously
pub const MIDSTATE_COUNT: usize = 4;

/// Size of the nonce the chip sweeps
pub const NONCE_SIZE: usize = 4;

/// Offset of the pool random echo inside the suffix
pub const RANDOM_OFFSET: usize = 27;

/// `expires` is a big-endian u32 at this offset of the block header
const EXPIRES_OFFSET: usize = 7;

/// Offset of the nonce echo inside the reported random
const RANDOM_NONCE_OFFSET: usize = 21;

/// Second placement of the nonce inside the padded suffix
const SUFFIX_NONCE_OFFSET: usize = 48;

/// `hash[32] ∥ nonce[4] ∥ prefix_index[4]`
const RESULT_SIZE: usize = sha256::DIGEST_SIZE + NONCE_SIZE + 4;

/// Delay between two status polls
const STATUS_POLL_DELAY: Duration = Duration::from_millis(100);

/// The 123-byte buffer a job is derived from
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBlock {
    bytes: [u8; BLOCK_SIZE],
}

impl CandidateBlock {
    /// Assemble a block from pool parameters and a random tail. The random is
    /// placed both after the header and at the very end of the block.
    pub fn assemble(header: &[u8], seed: &[u8], random: &[u8; 32]) -> error::Result<Self> {
        if header.len() + seed.len() + 2 * random.len() != BLOCK_SIZE {
            Err(error::ErrorKind::Config(format!(
                "invalid pool parameters: header {} + seed {} bytes",
                header.len(),
                seed.len()
            )))?
        }
        let mut bytes = Vec::with_capacity(BLOCK_SIZE);
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(random);
        bytes.extend_from_slice(seed);
        bytes.extend_from_slice(random);
        Ok(Self {
            bytes: bytes[..].try_into().expect("BUG: block size"),
        })
    }

    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.bytes[..PREFIX_SIZE]
    }

    pub fn suffix(&self) -> &[u8] {
        &self.bytes[PREFIX_SIZE..]
    }

    /// The pool-visible random echo at the tail of the block
    pub fn tail_random(&self) -> &[u8] {
        &self.suffix()[RANDOM_OFFSET..]
    }

    pub fn expires(&self) -> u32 {
        u32::from_be_bytes(
            self.bytes[EXPIRES_OFFSET..EXPIRES_OFFSET + 4]
                .try_into()
                .expect("BUG: expires field size"),
        )
    }

    /// The prefix with `expires − (index − 1)` patched in, `index ∈ 1..=4`
    pub fn prefix_variant(&self, index: u32) -> [u8; PREFIX_SIZE] {
        let mut prefix: [u8; PREFIX_SIZE] =
            self.prefix().try_into().expect("BUG: prefix size");
        let expires = self.expires().wrapping_sub(index - 1);
        prefix[EXPIRES_OFFSET..EXPIRES_OFFSET + 4].copy_from_slice(&expires.to_be_bytes());
        prefix
    }

    /// Midstates for all `expires` window variants, in submission order
    pub fn midstates(&self) -> [[u8; sha256::DIGEST_SIZE]; MIDSTATE_COUNT] {
        let mut midstates = [[0u8; sha256::DIGEST_SIZE]; MIDSTATE_COUNT];
        for (slot, midstate) in midstates.iter_mut().enumerate() {
            *midstate = sha256::midstate(&self.prefix_variant(slot as u32 + 1));
        }
        midstates
    }

    /// The suffix extended with the literal `80 00 00 00 00` tail to one full
    /// compression block, the form the chip consumes.
    pub fn padded_suffix(&self) -> [u8; PREFIX_SIZE] {
        let mut padded = [0u8; PREFIX_SIZE];
        padded[..SUFFIX_SIZE].copy_from_slice(self.suffix());
        padded[SUFFIX_SIZE] = 0x80;
        padded
    }
}

/// What the worker hands to the reporting pipeline for one winning nonce
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    /// Tail random with the nonce echoed at the pool-defined offset
    pub random: [u8; 32],
    /// Locally recomputed (and chip confirmed) hash
    pub value: [u8; sha256::DIGEST_SIZE],
    /// The `expires` value of the midstate variant that won
    pub expires: u32,
}

/// Serialized job image: opcode, query id, midstates, padded suffix,
/// iteration budget.
pub fn job_image(query_id: u32, block: &CandidateBlock, iterations: u32) -> Vec<u8> {
    let mut job = Vec::with_capacity(
        1 + 4 + MIDSTATE_COUNT * sha256::DIGEST_SIZE + PREFIX_SIZE + 4,
    );
    job.push(JOB_OPCODE);
    job.extend_from_slice(&query_id.to_be_bytes());
    for midstate in block.midstates().iter() {
        job.extend_from_slice(midstate);
    }
    job.extend_from_slice(&block.padded_suffix());
    job.extend_from_slice(&iterations.to_be_bytes());
    job
}

/// Whether a hash meets the pool difficulty: four zero bytes and the fifth
/// at most 0x0F. Anything below is silently dropped (but still counts
/// toward the hashrate).
pub fn meets_difficulty(value: &[u8; sha256::DIGEST_SIZE]) -> bool {
    value[..4].iter().all(|byte| *byte == 0) && value[4] <= 0x0F
}

/// Submit a job to `chip_id` and poll it to completion.
///
/// The caller supplied `job_timeout` caps the whole submit/poll cycle; the
/// channel itself additionally bounds every single read.
pub async fn perform_job<T: Bus + ?Sized>(
    bus: &T,
    chip_id: u8,
    block: &CandidateBlock,
    iterations: u32,
    job_timeout: Duration,
) -> error::Result<JobResult> {
    let query_id = bus.next_query_id();
    let job = job_image(query_id, block, iterations);
    debug!(
        "chip {}: submitting job {} ({} iterations)",
        chip_id, query_id, iterations
    );
    bus.write(chip_id, TYPE_CHAIN, &job).await?;

    let started = Instant::now();
    loop {
        if started.elapsed() >= job_timeout {
            Err(JobError::Timeout)?
        }
        tokio::time::sleep(STATUS_POLL_DELAY).await;

        let response = bus.request(chip_id, TYPE_CHAIN, &[STATUS_OPCODE]).await?;
        if response.data.is_empty() {
            Err(FrameError::Invalid)?
        }

        let state = response.data[0];
        if state == 0 {
            Err(JobError::NoJob)?
        }

        let rest = &response.data[1..];
        if rest.len() < 4 {
            Err(FrameError::Invalid)?
        }
        let received_id = u32::from_be_bytes(rest[..4].try_into().expect("BUG: id size"));
        if received_id != query_id {
            debug!(
                "chip {}: expected job {:#x}, got {:#x}",
                chip_id, query_id, received_id
            );
            Err(JobError::Mismatch)?
        }

        match state {
            1 => continue,
            2 => {
                debug!(
                    "chip {}: job {} completed in {:?}",
                    chip_id,
                    query_id,
                    started.elapsed()
                );
                return assemble_result(block, &rest[4..]);
            }
            _ => Err(JobError::InvalidState)?,
        }
    }
}

/// Re-verify a raw chip result and convert it into the pool-facing form
fn assemble_result(block: &CandidateBlock, result: &[u8]) -> error::Result<JobResult> {
    if result.len() < RESULT_SIZE {
        Err(FrameError::Invalid)?
    }
    let hash = &result[..sha256::DIGEST_SIZE];
    let nonce = &result[sha256::DIGEST_SIZE..sha256::DIGEST_SIZE + NONCE_SIZE];
    let prefix_index = u32::from_be_bytes(
        result[sha256::DIGEST_SIZE + NONCE_SIZE..RESULT_SIZE]
            .try_into()
            .expect("BUG: prefix index size"),
    );
    if prefix_index < 1 || prefix_index > MIDSTATE_COUNT as u32 {
        Err(JobError::PrefixIndex)?
    }

    // the chip uses the nonce both as the first word of the suffix block and
    // as the pool-visible echo near its end
    let mut xored = block.padded_suffix();
    xored[..NONCE_SIZE].copy_from_slice(nonce);
    xored[SUFFIX_NONCE_OFFSET..SUFFIX_NONCE_OFFSET + NONCE_SIZE].copy_from_slice(nonce);

    let prefix = block.prefix_variant(prefix_index);
    let mut engine = sha256::Sha256::new();
    engine.update(&prefix);
    engine.update(&xored[..SUFFIX_SIZE]);
    let local_hash = engine.finalize();

    if local_hash[..] != hash[..] {
        debug!(
            "hash mismatch: chip {} local {}",
            hex::encode(hash),
            hex::encode(local_hash)
        );
        Err(JobError::HashMismatch)?
    }

    let mut random: [u8; 32] = block.tail_random().try_into().expect("BUG: random size");
    random[RANDOM_NONCE_OFFSET..RANDOM_NONCE_OFFSET + NONCE_SIZE].copy_from_slice(nonce);

    Ok(JobResult {
        random,
        value: local_hash,
        expires: block.expires().wrapping_sub(prefix_index - 1),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::uart::test_utils::FakeChip;

    fn sample_block() -> CandidateBlock {
        let mut bytes = [0u8; BLOCK_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(13).wrapping_add(7);
        }
        // give expires a recognizable value
        bytes[EXPIRES_OFFSET..EXPIRES_OFFSET + 4].copy_from_slice(&0x0100_0010u32.to_be_bytes());
        CandidateBlock::from_bytes(bytes)
    }

    /// A status response frame body: state, query id, then the result bytes
    fn status_response(state: u8, query_id: u32, result: &[u8]) -> Vec<u8> {
        let mut data = vec![state];
        data.extend_from_slice(&query_id.to_be_bytes());
        data.extend_from_slice(result);
        data
    }

    /// Chip result bytes the local verification will agree with
    fn winning_result(block: &CandidateBlock, nonce: [u8; NONCE_SIZE], prefix_index: u32) -> Vec<u8> {
        let mut xored = block.padded_suffix();
        xored[..NONCE_SIZE].copy_from_slice(&nonce);
        xored[SUFFIX_NONCE_OFFSET..SUFFIX_NONCE_OFFSET + NONCE_SIZE].copy_from_slice(&nonce);
        let mut engine = sha256::Sha256::new();
        engine.update(&block.prefix_variant(prefix_index));
        engine.update(&xored[..SUFFIX_SIZE]);
        let hash = engine.finalize();

        let mut result = Vec::new();
        result.extend_from_slice(&hash);
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&prefix_index.to_be_bytes());
        result
    }

    #[test]
    fn test_assemble_layout() {
        let header = [0x11u8; 11];
        let seed = [0x22u8; 48];
        let random = [0x33u8; 32];
        let block = CandidateBlock::assemble(&header, &seed, &random).expect("assemble");
        assert_eq!(&block.bytes[..11], &header[..]);
        assert_eq!(&block.bytes[11..43], &random[..]);
        assert_eq!(&block.bytes[43..91], &seed[..]);
        assert_eq!(&block.bytes[91..], &random[..]);
        assert_eq!(block.tail_random(), &random[..]);
    }

    #[test]
    fn test_assemble_rejects_wrong_sizes() {
        let err = CandidateBlock::assemble(&[0u8; 10], &[0u8; 48], &[0u8; 32])
            .expect_err("assembled")
            .kind();
        match err {
            ErrorKind::Config(_) => (),
            other => panic!("unexpected error kind {:?}", other),
        }
    }

    #[test]
    fn test_expires_window() {
        let block = sample_block();
        assert_eq!(block.expires(), 0x0100_0010);
        for index in 1..=MIDSTATE_COUNT as u32 {
            let prefix = block.prefix_variant(index);
            let patched =
                u32::from_be_bytes(prefix[EXPIRES_OFFSET..EXPIRES_OFFSET + 4].try_into().unwrap());
            assert_eq!(patched, 0x0100_0010 - (index - 1));
        }
        // everything else of the prefix stays untouched
        let variant = block.prefix_variant(4);
        assert_eq!(&variant[..EXPIRES_OFFSET], &block.prefix()[..EXPIRES_OFFSET]);
        assert_eq!(
            &variant[EXPIRES_OFFSET + 4..],
            &block.prefix()[EXPIRES_OFFSET + 4..]
        );
    }

    #[test]
    fn test_midstates_match_engine() {
        let block = sample_block();
        let midstates = block.midstates();
        for (slot, midstate) in midstates.iter().enumerate() {
            let expected = sha256::midstate(&block.prefix_variant(slot as u32 + 1));
            assert_eq!(midstate, &expected);
        }
        // variants differ because expires differs
        assert_ne!(midstates[0], midstates[1]);
    }

    #[test]
    fn test_job_image_layout() {
        let block = sample_block();
        let job = job_image(0xAABBCCDD, &block, 800_000_000);
        assert_eq!(job.len(), 1 + 4 + 128 + 64 + 4);
        assert_eq!(job[0], JOB_OPCODE);
        assert_eq!(&job[1..5], &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(&job[5..37], &block.midstates()[0]);
        assert_eq!(&job[101..133], &block.midstates()[3]);
        assert_eq!(&job[133..197], &block.padded_suffix());
        assert_eq!(&job[197..], &800_000_000u32.to_be_bytes());
    }

    #[test]
    fn test_padded_suffix() {
        let block = sample_block();
        let padded = block.padded_suffix();
        assert_eq!(&padded[..SUFFIX_SIZE], block.suffix());
        assert_eq!(&padded[SUFFIX_SIZE..], &[0x80, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_difficulty_filter() {
        let mut value = [0u8; 32];
        value[4] = 0x0F;
        assert!(meets_difficulty(&value));
        value[4] = 0x10;
        assert!(!meets_difficulty(&value));
        value[4] = 0x00;
        assert!(meets_difficulty(&value));
        value[0] = 0x01;
        assert!(!meets_difficulty(&value));
    }

    #[tokio::test]
    async fn test_poll_until_done() {
        let block = sample_block();
        let chip = FakeChip::new(42);
        let nonce = [0xDE, 0xAD, 0xBE, 0xEF];
        chip.push_response(1, status_response(1, 42, &[]));
        chip.push_response(1, status_response(1, 42, &[]));
        chip.push_response(1, status_response(1, 42, &[]));
        chip.push_response(1, status_response(2, 42, &winning_result(&block, nonce, 1)));

        let result = perform_job(&chip, 1, &block, 1000, Duration::from_secs(5))
            .await
            .expect("job failed");

        // the job submission plus four status polls went over the bus
        let writes = chip.written_frames();
        assert_eq!(writes.len(), 5);
        assert_eq!(writes[0].2[0], JOB_OPCODE);
        assert_eq!(&writes[0].2[1..5], &42u32.to_be_bytes());
        for poll in &writes[1..] {
            assert_eq!(poll.2, vec![STATUS_OPCODE]);
        }

        // the reported random carries the nonce at the echo offset
        let mut expected_random: [u8; 32] = block.tail_random().try_into().unwrap();
        expected_random[RANDOM_NONCE_OFFSET..RANDOM_NONCE_OFFSET + NONCE_SIZE]
            .copy_from_slice(&nonce);
        assert_eq!(result.random, expected_random);
        assert_eq!(result.expires, block.expires());
    }

    #[tokio::test]
    async fn test_later_prefix_variant_shifts_expires() {
        let block = sample_block();
        let chip = FakeChip::new(0);
        let nonce = [0x00, 0x00, 0x01, 0x00];
        chip.push_response(1, status_response(2, 0, &winning_result(&block, nonce, 3)));

        let result = perform_job(&chip, 1, &block, 1000, Duration::from_secs(5))
            .await
            .expect("job failed");
        assert_eq!(result.expires, block.expires() - 2);
    }

    #[tokio::test]
    async fn test_no_job_reported() {
        let chip = FakeChip::new(0);
        chip.push_response(1, status_response(0, 0, &[]));
        let err = perform_job(&chip, 1, &sample_block(), 1000, Duration::from_secs(5))
            .await
            .expect_err("job succeeded")
            .kind();
        assert_eq!(err, ErrorKind::Job(JobError::NoJob));
    }

    #[tokio::test]
    async fn test_query_id_mismatch_is_not_consumed() {
        let block = sample_block();
        let chip = FakeChip::new(10);
        let nonce = [1, 2, 3, 4];
        // completed response, but for somebody else's job
        chip.push_response(1, status_response(2, 9, &winning_result(&block, nonce, 1)));
        let err = perform_job(&chip, 1, &block, 1000, Duration::from_secs(5))
            .await
            .expect_err("job succeeded")
            .kind();
        assert_eq!(err, ErrorKind::Job(JobError::Mismatch));
    }

    #[tokio::test]
    async fn test_invalid_state() {
        let chip = FakeChip::new(0);
        chip.push_response(1, status_response(7, 0, &[]));
        let err = perform_job(&chip, 1, &sample_block(), 1000, Duration::from_secs(5))
            .await
            .expect_err("job succeeded")
            .kind();
        assert_eq!(err, ErrorKind::Job(JobError::InvalidState));
    }

    #[tokio::test]
    async fn test_short_result_payload() {
        let chip = FakeChip::new(0);
        chip.push_response(1, status_response(2, 0, &[0u8; RESULT_SIZE - 1]));
        let err = perform_job(&chip, 1, &sample_block(), 1000, Duration::from_secs(5))
            .await
            .expect_err("job succeeded")
            .kind();
        assert_eq!(err, ErrorKind::Frame(FrameError::Invalid));
    }

    #[tokio::test]
    async fn test_prefix_index_out_of_range() {
        let block = sample_block();
        for bad_index in &[0u32, 5] {
            let chip = FakeChip::new(0);
            let mut result = winning_result(&block, [0u8; NONCE_SIZE], 1);
            let offset = sha256::DIGEST_SIZE + NONCE_SIZE;
            result[offset..].copy_from_slice(&bad_index.to_be_bytes());
            chip.push_response(1, status_response(2, 0, &result));
            let err = perform_job(&chip, 1, &block, 1000, Duration::from_secs(5))
                .await
                .expect_err("job succeeded")
                .kind();
            assert_eq!(err, ErrorKind::Job(JobError::PrefixIndex));
        }
    }

    #[tokio::test]
    async fn test_forged_hash_is_rejected() {
        let block = sample_block();
        let chip = FakeChip::new(0);
        let mut result = winning_result(&block, [9, 9, 9, 9], 2);
        result[0] ^= 0x80;
        chip.push_response(1, status_response(2, 0, &result));
        let err = perform_job(&chip, 1, &block, 1000, Duration::from_secs(5))
            .await
            .expect_err("job succeeded")
            .kind();
        assert_eq!(err, ErrorKind::Job(JobError::HashMismatch));
    }

    #[tokio::test]
    async fn test_job_timeout() {
        let block = sample_block();
        let chip = FakeChip::new(0);
        // chip keeps answering "still working"
        for _ in 0..10 {
            chip.push_response(1, status_response(1, 0, &[]));
        }
        let err = perform_job(&chip, 1, &block, 1000, Duration::from_millis(250))
            .await
            .expect_err("job succeeded")
            .kind();
        assert_eq!(err, ErrorKind::Job(JobError::Timeout));
    }
}
