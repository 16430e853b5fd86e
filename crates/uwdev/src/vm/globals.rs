//! The 32 imported game globals at the bottom of conversation memory.

pub const PLAY_HUNGER: u16 = 0;
pub const PLAY_HEALTH: u16 = 1;
pub const PLAY_ARMS: u16 = 2;
pub const PLAY_POWER: u16 = 3;
pub const PLAY_HP: u16 = 4;
pub const PLAY_MANA: u16 = 5;
pub const PLAY_LEVEL: u16 = 6;
pub const NEW_PLAYER_EXP: u16 = 7;
pub const PLAY_NAME: u16 = 8;
pub const PLAY_POISON: u16 = 9;
pub const PLAY_DRAWN: u16 = 10;
pub const PLAY_SEX: u16 = 11;
pub const NPC_XHOME: u16 = 12;
pub const NPC_YHOME: u16 = 13;
pub const NPC_WHOAMI: u16 = 14;
pub const NPC_HUNGER: u16 = 15;
pub const NPC_HEALTH: u16 = 16;
pub const NPC_HP: u16 = 17;
pub const NPC_ARMS: u16 = 18;
pub const NPC_POWER: u16 = 19;
pub const NPC_GOAL: u16 = 20;
pub const NPC_ATTITUDE: u16 = 21;
pub const NPC_GTARG: u16 = 22;
pub const NPC_TALKEDTO: u16 = 23;
pub const NPC_LEVEL: u16 = 24;
pub const NPC_NAME: u16 = 25;
pub const DUNGEON_LEVEL: u16 = 26;
pub const RIDDLECOUNTER: u16 = 27;
pub const GAME_TIME: u16 = 28;
pub const GAME_DAYS: u16 = 29;
pub const GAME_MINS: u16 = 30;
pub const FIRST_ENCOUNTER: u16 = 31;

pub const COUNT: u16 = 32;

/// Default values for a fresh conversation, as the game seeds them.
#[must_use]
pub fn defaults() -> [u16; COUNT as usize] {
    let mut values = [0u16; COUNT as usize];
    values[PLAY_HEALTH as usize] = 30;
    values[PLAY_HP as usize] = 30;
    values[PLAY_MANA as usize] = 30;
    values[PLAY_LEVEL as usize] = 3;
    values[NPC_XHOME as usize] = 32;
    values[NPC_YHOME as usize] = 32;
    values[NPC_WHOAMI as usize] = 0x010C;
    values[NPC_HEALTH as usize] = 30;
    values[NPC_HP as usize] = 30;
    values[NPC_GOAL as usize] = 8;
    values[NPC_ATTITUDE as usize] = 3; // friendly
    values[DUNGEON_LEVEL as usize] = 1;
    values[GAME_TIME as usize] = 1;
    values[GAME_DAYS as usize] = 1;
    values[GAME_MINS as usize] = 1;
    values
}
