// Transaction-scoped matching of scaled-token events against Pool events.
//
// Within a transaction, events are processed in log_index order. A token
// Mint/Burn that matches a Pool event takes the Pool event's amount as the
// authoritative scaled delta; matched SUPPLY/WITHDRAW/REPAY events are
// consumed so they back at most one token event. LIQUIDATION_CALL is never
// consumed, because a single liquidation backs the debt burn, the
// collateral burn, and in aToken-receiving flows a collateral mint too.

use std::collections::{HashMap, HashSet};

use ethers::types::Address;
use log::debug;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::errors::EvmError;

use super::events::{PoolEvent, PoolEventKind, TokenEvent, TokenEventKind};
use super::token_math::{AssetClass, TokenMathVersion};

/// Token revisions per reserve, used to pick the rounding discipline when
/// computing scaled deltas from Pool event amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRevisions {
    pub a_token_revision: u8,
    pub v_token_revision: u8,
}

impl Default for ReserveRevisions {
    fn default() -> Self {
        Self {
            a_token_revision: 1,
            v_token_revision: 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatcherConfig {
    pub revisions: HashMap<Address, ReserveRevisions>,
    pub default_revisions: ReserveRevisions,
}

impl MatcherConfig {
    fn for_reserve(&self, reserve: Address) -> ReserveRevisions {
        self.revisions.get(&reserve).copied().unwrap_or(self.default_revisions)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchClassification {
    /// Backed by a consumed SUPPLY event.
    SupplyMatched { pool_log_index: u32 },
    /// Backed by a consumed WITHDRAW event.
    WithdrawMatched { pool_log_index: u32 },
    /// Backed by a consumed BORROW event.
    BorrowMatched { pool_log_index: u32 },
    /// Backed by a consumed REPAY event.
    RepayMatched { pool_log_index: u32 },
    /// Backed by a consumed DEFICIT_CREATED event.
    DeficitMatched { pool_log_index: u32 },
    /// Backed by an unconsumed LIQUIDATION_CALL (collateral side).
    LiquidationCollateralSeized { pool_log_index: u32 },
    /// Backed by an unconsumed LIQUIDATION_CALL (debt side).
    LiquidationDebtRepaid { pool_log_index: u32 },
    /// A mint whose value equals its balance increase with no validated
    /// SUPPLY behind it: only the index moves.
    PureInterest,
    /// No pool event applies; the processor computes from event data.
    EventDataOnly,
    /// A balance transfer. The sender is always debited; the recipient is
    /// only credited when it does not immediately burn the amount.
    TransferDebited { credit_recipient: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedTokenEvent {
    pub token_log_index: u32,
    pub classification: MatchClassification,
    /// Scaled amount derived from the matched Pool event, to be used
    /// verbatim by the processors.
    pub scaled_delta: Option<BigInt>,
}

/// Matches all token events of one transaction against its pool events.
/// Both slices are taken in log order; out-of-order input is sorted first.
pub fn match_transaction_events(
    pool_events: &[PoolEvent],
    token_events: &[TokenEvent],
    config: &MatcherConfig,
) -> Result<Vec<MatchedTokenEvent>, EvmError> {
    let mut pool_events: Vec<&PoolEvent> = pool_events.iter().collect();
    pool_events.sort_by_key(|event| event.log_index);
    let mut token_events_sorted: Vec<&TokenEvent> = token_events.iter().collect();
    token_events_sorted.sort_by_key(|event| event.log_index);

    let mut matcher = Matcher {
        pool_events,
        consumed: HashSet::new(),
        config,
    };

    let mut results = Vec::with_capacity(token_events_sorted.len());
    for (position, event) in token_events_sorted.iter().enumerate() {
        let matched = matcher.match_token_event(event, &token_events_sorted[position + 1..])?;
        results.push(matched);
    }
    Ok(results)
}

struct Matcher<'a> {
    pool_events: Vec<&'a PoolEvent>,
    consumed: HashSet<u32>,
    config: &'a MatcherConfig,
}

impl<'a> Matcher<'a> {
    fn match_token_event(
        &mut self,
        event: &TokenEvent,
        later_events: &[&TokenEvent],
    ) -> Result<MatchedTokenEvent, EvmError> {
        let math = {
            let revisions = self.config.for_reserve(event.reserve);
            match event.class {
                AssetClass::Collateral => {
                    TokenMathVersion::for_token_revision(revisions.a_token_revision)
                }
                AssetClass::Debt => TokenMathVersion::for_token_revision(revisions.v_token_revision),
            }
        };

        let (classification, scaled_delta) = match (&event.kind, event.class) {
            (
                TokenEventKind::Mint {
                    on_behalf_of,
                    value,
                    balance_increase,
                    index,
                    ..
                },
                AssetClass::Collateral,
            ) => self.match_collateral_mint(
                event.reserve,
                *on_behalf_of,
                value,
                balance_increase,
                index,
                math,
            )?,
            (
                TokenEventKind::Mint {
                    on_behalf_of,
                    value,
                    balance_increase,
                    index,
                    ..
                },
                AssetClass::Debt,
            ) => self.match_debt_mint(event.reserve, *on_behalf_of, value, balance_increase, index, math)?,
            (
                TokenEventKind::Burn { from, index, .. },
                AssetClass::Collateral,
            ) => self.match_collateral_burn(event.reserve, *from, index, math)?,
            (
                TokenEventKind::Burn { from, index, .. },
                AssetClass::Debt,
            ) => self.match_debt_burn(event.reserve, *from, index, math)?,
            (
                TokenEventKind::BalanceTransfer { to, value, index, .. },
                _,
            ) => {
                let credit_recipient = !recipient_burns_immediately(event.token, *to, value, later_events);
                let scaled = math.get_collateral_transfer_scaled_amount(value, index)?;
                (
                    MatchClassification::TransferDebited { credit_recipient },
                    Some(scaled),
                )
            }
        };

        Ok(MatchedTokenEvent {
            token_log_index: event.log_index,
            classification,
            scaled_delta,
        })
    }

    fn find_supply(
        &self,
        reserve: Address,
        beneficiary: Address,
    ) -> Option<(u32, BigInt)> {
        self.pool_events.iter().find_map(|event| {
            if self.consumed.contains(&event.log_index) {
                return None;
            }
            match &event.kind {
                PoolEventKind::Supply {
                    reserve: supply_reserve,
                    user,
                    on_behalf_of,
                    amount,
                } if *supply_reserve == reserve => {
                    // a zero on_behalf_of means the caller supplied for
                    // itself; match on the user field instead
                    let target = if on_behalf_of.is_zero() { *user } else { *on_behalf_of };
                    if target == beneficiary {
                        Some((event.log_index, amount.clone()))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        })
    }

    fn match_collateral_mint(
        &mut self,
        reserve: Address,
        on_behalf_of: Address,
        value: &BigInt,
        balance_increase: &BigInt,
        index: &BigInt,
        math: TokenMathVersion,
    ) -> Result<(MatchClassification, Option<BigInt>), EvmError> {
        if balance_increase > value {
            // interest leg of a withdrawal; no pool event backs it
            return Ok((MatchClassification::EventDataOnly, None));
        }

        let supply = self.find_supply(reserve, on_behalf_of);

        if value == balance_increase {
            // Pure-interest mints only accept a SUPPLY whose scaled amount
            // matches the minted value; anything else is plain accrual.
            if let Some((pool_log_index, amount)) = supply {
                let supply_scaled = math.get_collateral_mint_scaled_amount(&amount, index)?;
                let value_scaled = math.get_collateral_mint_scaled_amount(value, index)?;
                if supply_scaled == value_scaled {
                    self.consumed.insert(pool_log_index);
                    return Ok((
                        MatchClassification::SupplyMatched { pool_log_index },
                        Some(supply_scaled),
                    ));
                }
                debug!(
                    "rejecting SUPPLY match at log {pool_log_index}: scaled amount mismatch"
                );
            }
            return Ok((MatchClassification::PureInterest, Some(BigInt::from(0u8))));
        }

        match supply {
            Some((pool_log_index, amount)) => {
                self.consumed.insert(pool_log_index);
                let scaled = math.get_collateral_mint_scaled_amount(&amount, index)?;
                Ok((
                    MatchClassification::SupplyMatched { pool_log_index },
                    Some(scaled),
                ))
            }
            None => Ok((MatchClassification::EventDataOnly, None)),
        }
    }

    fn match_debt_mint(
        &mut self,
        reserve: Address,
        on_behalf_of: Address,
        value: &BigInt,
        balance_increase: &BigInt,
        index: &BigInt,
        math: TokenMathVersion,
    ) -> Result<(MatchClassification, Option<BigInt>), EvmError> {
        if value <= balance_increase {
            // repay interest leg or pure accrual; mint-class events never
            // consume REPAY (reserved for the burn in repay-with-aTokens)
            return Ok((MatchClassification::EventDataOnly, None));
        }

        let borrow = self.pool_events.iter().find_map(|event| {
            if self.consumed.contains(&event.log_index) {
                return None;
            }
            match &event.kind {
                PoolEventKind::Borrow {
                    reserve: borrow_reserve,
                    on_behalf_of: borrow_beneficiary,
                    amount,
                    ..
                } if *borrow_reserve == reserve && *borrow_beneficiary == on_behalf_of => {
                    Some((event.log_index, amount.clone()))
                }
                _ => None,
            }
        });

        match borrow {
            Some((pool_log_index, amount)) => {
                self.consumed.insert(pool_log_index);
                let scaled = math.get_debt_mint_scaled_amount(&amount, index)?;
                Ok((
                    MatchClassification::BorrowMatched { pool_log_index },
                    Some(scaled),
                ))
            }
            None => Ok((MatchClassification::EventDataOnly, None)),
        }
    }

    fn match_collateral_burn(
        &mut self,
        reserve: Address,
        from: Address,
        index: &BigInt,
        math: TokenMathVersion,
    ) -> Result<(MatchClassification, Option<BigInt>), EvmError> {
        let mut matched: Option<(u32, bool, BigInt)> = None;
        for event in &self.pool_events {
            if self.consumed.contains(&event.log_index) {
                continue;
            }
            match &event.kind {
                PoolEventKind::Withdraw {
                    reserve: withdraw_reserve,
                    user,
                    amount,
                    ..
                } if *withdraw_reserve == reserve && *user == from => {
                    matched = Some((event.log_index, true, amount.clone()));
                    break;
                }
                PoolEventKind::LiquidationCall {
                    collateral_asset,
                    user,
                    liquidated_collateral_amount,
                    ..
                } if *collateral_asset == reserve && *user == from => {
                    matched = Some((event.log_index, false, liquidated_collateral_amount.clone()));
                    break;
                }
                _ => {}
            }
        }

        match matched {
            Some((pool_log_index, is_withdraw, amount)) => {
                let scaled = math.get_collateral_burn_scaled_amount(&amount, index)?;
                if is_withdraw {
                    self.consumed.insert(pool_log_index);
                    Ok((
                        MatchClassification::WithdrawMatched { pool_log_index },
                        Some(scaled),
                    ))
                } else {
                    Ok((
                        MatchClassification::LiquidationCollateralSeized { pool_log_index },
                        Some(scaled),
                    ))
                }
            }
            None => Ok((MatchClassification::EventDataOnly, None)),
        }
    }

    fn match_debt_burn(
        &mut self,
        reserve: Address,
        from: Address,
        index: &BigInt,
        math: TokenMathVersion,
    ) -> Result<(MatchClassification, Option<BigInt>), EvmError> {
        enum DebtMatch {
            Repay,
            Liquidation,
            Deficit,
        }

        let mut matched: Option<(u32, DebtMatch, BigInt)> = None;
        for event in &self.pool_events {
            if self.consumed.contains(&event.log_index) {
                continue;
            }
            match &event.kind {
                PoolEventKind::Repay {
                    reserve: repay_reserve,
                    user,
                    amount,
                    ..
                } if *repay_reserve == reserve && *user == from => {
                    matched = Some((event.log_index, DebtMatch::Repay, amount.clone()));
                    break;
                }
                PoolEventKind::LiquidationCall {
                    debt_asset,
                    user,
                    debt_to_cover,
                    ..
                } if *debt_asset == reserve && *user == from => {
                    matched = Some((event.log_index, DebtMatch::Liquidation, debt_to_cover.clone()));
                    break;
                }
                PoolEventKind::DeficitCreated {
                    user,
                    debt_asset,
                    amount_created,
                } if *debt_asset == reserve && *user == from => {
                    matched = Some((event.log_index, DebtMatch::Deficit, amount_created.clone()));
                    break;
                }
                _ => {}
            }
        }

        match matched {
            Some((pool_log_index, kind, amount)) => {
                let scaled = math.get_debt_burn_scaled_amount(&amount, index)?;
                let classification = match kind {
                    DebtMatch::Repay => {
                        self.consumed.insert(pool_log_index);
                        MatchClassification::RepayMatched { pool_log_index }
                    }
                    DebtMatch::Liquidation => {
                        // never consumed; the collateral side needs it too
                        MatchClassification::LiquidationDebtRepaid { pool_log_index }
                    }
                    DebtMatch::Deficit => {
                        self.consumed.insert(pool_log_index);
                        MatchClassification::DeficitMatched { pool_log_index }
                    }
                };
                Ok((classification, Some(scaled)))
            }
            None => Ok((MatchClassification::EventDataOnly, None)),
        }
    }
}

/// True when a later burn from `recipient` on the same token matches the
/// transferred amount: the recipient is a router or adapter that burns on
/// receipt, so its balance must not be credited.
fn recipient_burns_immediately(
    token: Address,
    recipient: Address,
    amount: &BigInt,
    later_events: &[&TokenEvent],
) -> bool {
    later_events.iter().any(|event| {
        event.token == token
            && matches!(
                &event.kind,
                TokenEventKind::Burn { from, value, .. } if *from == recipient && value == amount
            )
    })
}
