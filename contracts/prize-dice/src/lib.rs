#![no_std]

//! # Prize Dice
//!
//! A house-funded dice game settled instantly in a custodied
//! stablecoin-pegged token. A player picks a number from 1 to 6 and rolls
//! against the contract's prize pool: a match pays a fixed prize within the
//! same call, a miss pays nothing. There is no per-play stake — the house
//! seeds the pool via `deposit`, and the pool is capped.
//!
//! ## Game flow
//! 1. Deploy with an owner and the token address; the house funds the pool
//!    via `deposit` (allowance-based pull, never past `MAX_PRIZE_POOL`).
//! 2. A player calls `play(n)` with `n` in 1-6. The call is refused while
//!    the game is paused, during the player's cooldown window, or when the
//!    pool cannot cover one prize.
//! 3. The roll is derived on-chain and settled in the same invocation: on a
//!    win `PRIZE_AMOUNT` transfers to the player immediately; the outcome is
//!    reported through the play-result event either way.
//! 4. The owner can `withdraw` liquidity, sweep everything with
//!    `emergency_withdraw`, or `set_paused` to stop play.
//!
//! ## Randomness
//! The roll mixes the ledger PRNG value, the ledger timestamp, the player
//! address, an internal nonce, the network id, and the live pool balance
//! through keccak-256, reduced to 1-6. Fast and cheap, NOT unpredictable:
//! whoever produces the ledger can observe or bias every input. That trade
//! is deliberate for a small fixed prize; the derivation sits behind one
//! function so a verifiable source can replace it without touching
//! settlement.

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token, Address, Bytes,
    BytesN, Env, Vec,
};

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract Events
// ═══════════════════════════════════════════════════════════════════════════════

/// Emitted exactly once per accepted play, win or lose.
#[contractevent]
pub struct EvPlayResult {
    pub player: Address,
    pub chosen_number: u32,
    pub rolled_number: u32,
    pub won: bool,
}

/// Emitted after the prize transfer of a winning play.
#[contractevent]
pub struct EvPrizeClaimed {
    pub player: Address,
    pub amount: i128,
}

#[contractevent]
pub struct EvFundsDeposited {
    pub depositor: Address,
    pub amount: i128,
}

/// Emitted by both `withdraw` and `emergency_withdraw`.
#[contractevent]
pub struct EvFundsWithdrawn {
    pub owner: Address,
    pub amount: i128,
}

#[contractevent]
pub struct EvPauseChanged {
    pub actor: Address,
    pub is_paused: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum PrizeDiceError {
    NotInitialized = 1,
    NotOwner = 2,
    InvalidNumber = 3,
    InvalidAmount = 4,
    GamePaused = 5,
    CooldownActive = 6,
    InsufficientPrizePool = 7,
    PrizePoolCapExceeded = 8,
    InsufficientTreasury = 9,
    TreasuryEmpty = 10,
    TokenTransferFailed = 11,
    ReentrantCall = 12,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Engine state & storage keys
// ═══════════════════════════════════════════════════════════════════════════════

/// Contract-wide mutable state: one instance-storage entry, read at the top
/// of an operation and written back once.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineState {
    pub paused: bool,
    pub games_played: u64,
    pub games_won: u64,
    /// Feeds the roll derivation; never exposed, wraps at u64::MAX.
    pub roll_nonce: u64,
}

/// One settled play, stored per player (ring buffer, newest last).
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlaySummary {
    pub chosen_number: u32,
    pub rolled_number: u32,
    pub won: bool,
    pub ledger: u32,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GameStats {
    pub games_played: u64,
    pub games_won: u64,
    pub win_rate_percent: u64,
}

#[contracttype]
#[derive(Clone)]
enum StorageKey {
    Owner,
    Token,
    Engine,
    /// Timestamp of the player's last accepted play.
    LastPlay(Address),
    PlayerHistory(Address),
    /// Transient re-entrancy lock, held for the duration of one guarded call.
    Guard,
}

/// Entropy sources for one roll. Every field is observable on-chain; the
/// pool balance in particular is near-constant between settlements and
/// contributes little beyond noise.
pub(crate) struct RollEntropy {
    pub beacon: u64,
    pub timestamp: u64,
    pub player: Address,
    pub nonce: u64,
    pub network_id: BytesN<32>,
    pub treasury_balance: i128,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Highest selectable face; rolls land in [1, MAX_NUMBER].
pub const MAX_NUMBER: u32 = 6;

/// Fixed payout per winning play, in token units.
pub const PRIZE_AMOUNT: i128 = 10_000;

/// Minimum gap between two accepted plays from the same address.
pub const COOLDOWN_SECONDS: u64 = 10;

/// Deposit ceiling for the pool. Play is also refused above this, so a pool
/// inflated by direct token transfers stays closed until the owner drains it.
pub const MAX_PRIZE_POOL: i128 = 1_000_000;

// Ledger rate is approximately 5 seconds per ledger on Stellar
const LEDGER_RATE_SECS: u32 = 5;

// Cooldown records only matter for COOLDOWN_SECONDS, but are bumped a week
// so returning players never pay an archive restore.
const COOLDOWN_TTL_SECONDS: u32 = 7 * 24 * 60 * 60; // 604,800 seconds
const COOLDOWN_TTL_LEDGERS: u32 = COOLDOWN_TTL_SECONDS / LEDGER_RATE_SECS; // 120,960 ledgers

// History TTL: 120 days — persistent storage for player play history
const HISTORY_TTL_SECONDS: u32 = 120 * 24 * 60 * 60; // 10,368,000 seconds
const HISTORY_TTL_LEDGERS: u32 = HISTORY_TTL_SECONDS / LEDGER_RATE_SECS; // 2,073,600 ledgers

// Instance storage (owner, token, engine state) kept 30 days past the last write
const INSTANCE_TTL_SECONDS: u32 = 30 * 24 * 60 * 60; // 2,592,000 seconds
const INSTANCE_TTL_LEDGERS: u32 = INSTANCE_TTL_SECONDS / LEDGER_RATE_SECS; // 518,400 ledgers

/// Max play summaries stored per player (ring buffer)
const MAX_HISTORY_PER_PLAYER: u32 = 50;

// ═══════════════════════════════════════════════════════════════════════════════
//  Contract
// ═══════════════════════════════════════════════════════════════════════════════

#[contract]
pub struct PrizeDiceContract;

#[contractimpl]
impl PrizeDiceContract {
    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Constructor
    // ───────────────────────────────────────────────────────────────────────────

    pub fn __constructor(env: Env, owner: Address, token: Address) {
        env.storage().instance().set(&StorageKey::Owner, &owner);
        env.storage().instance().set(&StorageKey::Token, &token);
        env.storage().instance().set(
            &StorageKey::Engine,
            &EngineState {
                paused: false,
                games_played: 0,
                games_won: 0,
                roll_nonce: 0,
            },
        );
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Play
    // ───────────────────────────────────────────────────────────────────────────

    /// Roll against the pool with a chosen number in [1, 6].
    ///
    /// Refused while paused, inside the caller's cooldown window, or when
    /// the live pool balance cannot cover one prize (or sits above the
    /// cap). An accepted play starts the cooldown and bumps the totals win
    /// or lose; a winning play additionally transfers `PRIZE_AMOUNT` to the
    /// player in the same invocation. The outcome is only reported through
    /// the play-result event — there is no return value to poll.
    pub fn play(env: Env, player: Address, chosen_number: u32) -> Result<(), PrizeDiceError> {
        player.require_auth();
        Self::acquire_guard(&env)?;

        if chosen_number < 1 || chosen_number > MAX_NUMBER {
            return Err(PrizeDiceError::InvalidNumber);
        }

        let mut state = Self::load_state(&env)?;
        if state.paused {
            return Err(PrizeDiceError::GamePaused);
        }

        let now = env.ledger().timestamp();
        let cooldown_key = StorageKey::LastPlay(player.clone());
        if let Some(last) = env
            .storage()
            .persistent()
            .get::<StorageKey, u64>(&cooldown_key)
        {
            if now < last.saturating_add(COOLDOWN_SECONDS) {
                return Err(PrizeDiceError::CooldownActive);
            }
        }

        // Treasury is read live from the token ledger, never cached.
        let token_addr = Self::load_token(&env)?;
        let balance =
            token::Client::new(&env, &token_addr).balance(&env.current_contract_address());
        if balance < PRIZE_AMOUNT {
            return Err(PrizeDiceError::InsufficientPrizePool);
        }
        if balance > MAX_PRIZE_POOL {
            return Err(PrizeDiceError::PrizePoolCapExceeded);
        }

        let nonce = state.roll_nonce;
        state.roll_nonce = state.roll_nonce.wrapping_add(1);

        let entropy = RollEntropy {
            beacon: env.prng().gen(),
            timestamp: now,
            player: player.clone(),
            nonce,
            network_id: env.ledger().network_id(),
            treasury_balance: balance,
        };
        let rolled_number = Self::derive_roll(&env, &entropy);
        let won = rolled_number == chosen_number;

        // Cooldown starts win or lose.
        env.storage().persistent().set(&cooldown_key, &now);
        env.storage().persistent().extend_ttl(
            &cooldown_key,
            COOLDOWN_TTL_LEDGERS,
            COOLDOWN_TTL_LEDGERS,
        );

        state.games_played = state.games_played.saturating_add(1);

        EvPlayResult {
            player: player.clone(),
            chosen_number,
            rolled_number,
            won,
        }.publish(&env);

        if won {
            Self::pay_out(&env, &token_addr, &player, PRIZE_AMOUNT)?;
            state.games_won = state.games_won.saturating_add(1);
            EvPrizeClaimed {
                player: player.clone(),
                amount: PRIZE_AMOUNT,
            }.publish(&env);
        }

        Self::save_state(&env, &state);
        Self::record_play(&env, &player, chosen_number, rolled_number, won);

        Self::release_guard(&env);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Liquidity
    // ───────────────────────────────────────────────────────────────────────────

    /// Pull `amount` of the custodied token from the depositor into the
    /// pool. The depositor must have approved this contract as spender
    /// beforehand; the resulting balance may never exceed `MAX_PRIZE_POOL`
    /// (checked against the balance at call time).
    pub fn deposit(env: Env, depositor: Address, amount: i128) -> Result<(), PrizeDiceError> {
        depositor.require_auth();
        Self::acquire_guard(&env)?;

        if amount <= 0 {
            return Err(PrizeDiceError::InvalidAmount);
        }

        let token_addr = Self::load_token(&env)?;
        let balance =
            token::Client::new(&env, &token_addr).balance(&env.current_contract_address());
        if balance.saturating_add(amount) > MAX_PRIZE_POOL {
            return Err(PrizeDiceError::PrizePoolCapExceeded);
        }

        Self::pull_in(&env, &token_addr, &depositor, amount)?;

        EvFundsDeposited { depositor, amount }.publish(&env);

        Self::extend_instance_ttl(&env);
        Self::release_guard(&env);
        Ok(())
    }

    /// Withdraw pool liquidity to the owner. Owner only.
    pub fn withdraw(env: Env, caller: Address, amount: i128) -> Result<(), PrizeDiceError> {
        let owner = Self::require_owner(&env, &caller)?;
        Self::acquire_guard(&env)?;

        if amount <= 0 {
            return Err(PrizeDiceError::InvalidAmount);
        }

        let token_addr = Self::load_token(&env)?;
        let balance =
            token::Client::new(&env, &token_addr).balance(&env.current_contract_address());
        if balance < amount {
            return Err(PrizeDiceError::InsufficientTreasury);
        }

        Self::pay_out(&env, &token_addr, &owner, amount)?;

        EvFundsWithdrawn { owner, amount }.publish(&env);

        Self::extend_instance_ttl(&env);
        Self::release_guard(&env);
        Ok(())
    }

    /// Sweep the entire pool to the owner in one call. Owner only.
    pub fn emergency_withdraw(env: Env, caller: Address) -> Result<(), PrizeDiceError> {
        let owner = Self::require_owner(&env, &caller)?;
        Self::acquire_guard(&env)?;

        let token_addr = Self::load_token(&env)?;
        let balance =
            token::Client::new(&env, &token_addr).balance(&env.current_contract_address());
        if balance <= 0 {
            return Err(PrizeDiceError::TreasuryEmpty);
        }

        Self::pay_out(&env, &token_addr, &owner, balance)?;

        EvFundsWithdrawn {
            owner,
            amount: balance,
        }.publish(&env);

        Self::extend_instance_ttl(&env);
        Self::release_guard(&env);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Admin
    // ───────────────────────────────────────────────────────────────────────────

    /// Set the pause flag. Owner only. Idempotent — re-setting the current
    /// value succeeds and still emits the pause-change event.
    pub fn set_paused(env: Env, caller: Address, paused: bool) -> Result<(), PrizeDiceError> {
        let owner = Self::require_owner(&env, &caller)?;

        let mut state = Self::load_state(&env)?;
        state.paused = paused;
        Self::save_state(&env, &state);

        EvPauseChanged {
            actor: owner,
            is_paused: paused,
        }.publish(&env);
        Ok(())
    }

    pub fn get_owner(env: Env) -> Result<Address, PrizeDiceError> {
        Self::load_owner(&env)
    }

    pub fn set_owner(env: Env, caller: Address, new_owner: Address) -> Result<(), PrizeDiceError> {
        Self::require_owner(&env, &caller)?;
        env.storage().instance().set(&StorageKey::Owner, &new_owner);
        Ok(())
    }

    pub fn get_token(env: Env) -> Result<Address, PrizeDiceError> {
        Self::load_token(&env)
    }

    pub fn upgrade(
        env: Env,
        caller: Address,
        new_wasm_hash: BytesN<32>,
    ) -> Result<(), PrizeDiceError> {
        Self::require_owner(&env, &caller)?;
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────────
    //  Public: Read-only queries
    // ───────────────────────────────────────────────────────────────────────────

    /// Seconds until the player may play again; 0 for a player with no
    /// accepted play on record.
    pub fn get_cooldown(env: Env, player: Address) -> u64 {
        let last: Option<u64> = env
            .storage()
            .persistent()
            .get(&StorageKey::LastPlay(player));
        match last {
            Some(last) => {
                let ready_at = last.saturating_add(COOLDOWN_SECONDS);
                ready_at.saturating_sub(env.ledger().timestamp())
            }
            None => 0,
        }
    }

    /// Live treasury balance, read from the token ledger.
    pub fn get_contract_balance(env: Env) -> Result<i128, PrizeDiceError> {
        let token_addr = Self::load_token(&env)?;
        Ok(token::Client::new(&env, &token_addr).balance(&env.current_contract_address()))
    }

    /// Number of full prizes the current pool can pay.
    pub fn get_available_prizes(env: Env) -> Result<i128, PrizeDiceError> {
        Ok(Self::get_contract_balance(env)? / PRIZE_AMOUNT)
    }

    pub fn get_game_stats(env: Env) -> Result<GameStats, PrizeDiceError> {
        let state = Self::load_state(&env)?;
        let win_rate_percent = if state.games_played > 0 {
            state.games_won.saturating_mul(100) / state.games_played
        } else {
            0
        };
        Ok(GameStats {
            games_played: state.games_played,
            games_won: state.games_won,
            win_rate_percent,
        })
    }

    pub fn is_paused(env: Env) -> Result<bool, PrizeDiceError> {
        Ok(Self::load_state(&env)?.paused)
    }

    /// A player's most recent plays (up to 50), oldest first.
    pub fn get_player_history(env: Env, player: Address) -> Vec<PlaySummary> {
        env.storage()
            .persistent()
            .get(&StorageKey::PlayerHistory(player))
            .unwrap_or_else(|| Vec::new(&env))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Roll derivation
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mix the entropy sources through keccak-256 and reduce the digest to
    /// [1, MAX_NUMBER]. Deterministic in its inputs.
    fn derive_roll(env: &Env, entropy: &RollEntropy) -> u32 {
        let mut data = Bytes::from_array(env, &entropy.beacon.to_be_bytes());
        data.append(&Bytes::from_array(env, &entropy.timestamp.to_be_bytes()));
        data.append(&entropy.player.to_string().to_bytes());
        data.append(&Bytes::from_array(env, &entropy.nonce.to_be_bytes()));
        data.append(&Bytes::from_array(env, &entropy.network_id.to_array()));
        data.append(&Bytes::from_array(
            env,
            &entropy.treasury_balance.to_be_bytes(),
        ));

        let digest: BytesN<32> = env.crypto().keccak256(&data).into();
        let bytes = digest.to_array();

        // Fold the first 8 digest bytes into a u64, big-endian.
        let mut acc: u64 = 0;
        let mut i = 0usize;
        while i < 8 {
            acc = (acc << 8) | bytes[i] as u64;
            i += 1;
        }

        (acc % MAX_NUMBER as u64) as u32 + 1
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Token transfers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transfer out of the pool. Tolerates tokens that fail by error code or
    /// by trap: any non-success aborts the enclosing operation, rolling back
    /// every prior mutation in the call.
    fn pay_out(
        env: &Env,
        token_addr: &Address,
        to: &Address,
        amount: i128,
    ) -> Result<(), PrizeDiceError> {
        let client = token::Client::new(env, token_addr);
        match client.try_transfer(&env.current_contract_address(), to, &amount) {
            Ok(Ok(())) => Ok(()),
            _ => Err(PrizeDiceError::TokenTransferFailed),
        }
    }

    /// Allowance-based pull into the pool, with the same failure contract
    /// as `pay_out`.
    fn pull_in(
        env: &Env,
        token_addr: &Address,
        from: &Address,
        amount: i128,
    ) -> Result<(), PrizeDiceError> {
        let client = token::Client::new(env, token_addr);
        let engine = env.current_contract_address();
        match client.try_transfer_from(&engine, from, &engine, &amount) {
            Ok(Ok(())) => Ok(()),
            _ => Err(PrizeDiceError::TokenTransferFailed),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Re-entrancy guard
    // ═══════════════════════════════════════════════════════════════════════════

    // A failed invocation rolls its whole storage frame back, flag included,
    // so only the success paths release explicitly.

    fn acquire_guard(env: &Env) -> Result<(), PrizeDiceError> {
        if env.storage().temporary().has(&StorageKey::Guard) {
            return Err(PrizeDiceError::ReentrantCall);
        }
        env.storage().temporary().set(&StorageKey::Guard, &true);
        Ok(())
    }

    fn release_guard(env: &Env) {
        env.storage().temporary().remove(&StorageKey::Guard);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    //  Internal: Authorization & storage
    // ═══════════════════════════════════════════════════════════════════════════

    fn require_owner(env: &Env, caller: &Address) -> Result<Address, PrizeDiceError> {
        caller.require_auth();
        let owner = Self::load_owner(env)?;
        if *caller != owner {
            return Err(PrizeDiceError::NotOwner);
        }
        Ok(owner)
    }

    fn load_owner(env: &Env) -> Result<Address, PrizeDiceError> {
        env.storage()
            .instance()
            .get(&StorageKey::Owner)
            .ok_or(PrizeDiceError::NotInitialized)
    }

    fn load_token(env: &Env) -> Result<Address, PrizeDiceError> {
        env.storage()
            .instance()
            .get(&StorageKey::Token)
            .ok_or(PrizeDiceError::NotInitialized)
    }

    fn load_state(env: &Env) -> Result<EngineState, PrizeDiceError> {
        env.storage()
            .instance()
            .get(&StorageKey::Engine)
            .ok_or(PrizeDiceError::NotInitialized)
    }

    fn save_state(env: &Env, state: &EngineState) {
        env.storage().instance().set(&StorageKey::Engine, state);
        Self::extend_instance_ttl(env);
    }

    fn extend_instance_ttl(env: &Env) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_TTL_LEDGERS, INSTANCE_TTL_LEDGERS);
    }

    /// Append a play summary to the player's persistent history (ring
    /// buffer, max 50).
    fn record_play(env: &Env, player: &Address, chosen_number: u32, rolled_number: u32, won: bool) {
        let key = StorageKey::PlayerHistory(player.clone());
        let mut history: Vec<PlaySummary> = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or_else(|| Vec::new(env));

        // Ring buffer: drop oldest if at capacity
        while history.len() >= MAX_HISTORY_PER_PLAYER {
            history.remove(0);
        }

        history.push_back(PlaySummary {
            chosen_number,
            rolled_number,
            won,
            ledger: env.ledger().sequence(),
            timestamp: env.ledger().timestamp(),
        });

        env.storage().persistent().set(&key, &history);
        env.storage()
            .persistent()
            .extend_ttl(&key, HISTORY_TTL_LEDGERS, HISTORY_TTL_LEDGERS);
    }
}
