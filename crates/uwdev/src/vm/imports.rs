//! Imported functions: the host side of the `CALLI` opcode.
//!
//! Calling convention: the bytecode pushes each argument as an address
//! (via `PUSHI_EFF`), then the argument count, then executes `CALLI`.
//! The handler pops the count, pops that many addresses (rightmost
//! first), dereferences what it needs, and leaves its result in the
//! result register; the VM pushes that register afterwards.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::vm::globals;
use crate::vm::machine::{MEMORY_CELLS, Vm, VmError};

pub trait ImportHost {
    fn call(&mut self, id: u16, vm: &mut Vm) -> Result<(), VmError>;
}

/// Rejects every import. For programs that never leave the VM.
pub struct NoImports;

impl ImportHost for NoImports {
    fn call(&mut self, id: u16, vm: &mut Vm) -> Result<(), VmError> {
        Err(VmError::UnknownImport { id, pc: vm.pc() })
    }
}

pub type Handler = Box<dyn FnMut(&mut Vm) -> Result<(), VmError>>;

/// Open registration table for embedders that bring their own imports.
#[derive(Default)]
pub struct ImportTable {
    handlers: BTreeMap<u16, Handler>,
}

impl ImportTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: u16,
        handler: impl FnMut(&mut Vm) -> Result<(), VmError> + 'static,
    ) {
        self.handlers.insert(id, Box::new(handler));
    }
}

impl ImportHost for ImportTable {
    fn call(&mut self, id: u16, vm: &mut Vm) -> Result<(), VmError> {
        match self.handlers.get_mut(&id) {
            Some(handler) => handler(vm),
            None => Err(VmError::UnknownImport { id, pc: vm.pc() }),
        }
    }
}

/// Pop the argument count and the argument addresses, returned in
/// declaration (left-to-right) order.
pub fn pop_args(vm: &mut Vm) -> Result<Vec<u16>, VmError> {
    let count = vm.pop()?;
    let mut addresses = vec![0u16; usize::from(count)];
    for slot in addresses.iter_mut().rev() {
        *slot = vm.pop()?;
    }
    Ok(addresses)
}

/// One entry of a pending menu: its 1-based number and resolved text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub number: u16,
    pub string_id: u16,
    pub text: String,
}

/// What the conversation is waiting on after a suspension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInput {
    Menu { options: Vec<MenuOption> },
    Ask,
}

/// The conversation imports (ids 0..=50) from the original engine.
///
/// Interactive handlers record what they need and suspend the VM; the
/// embedder shows `pending_input` to the player and calls
/// `Vm::resume` with the reply. Everything else completes in place.
pub struct StandardImports {
    quests: BTreeMap<u16, u16>,
    rng: SmallRng,
    pending: Option<PendingInput>,
}

impl Default for StandardImports {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardImports {
    #[must_use]
    pub fn new() -> Self {
        Self {
            quests: BTreeMap::new(),
            rng: SmallRng::from_os_rng(),
            pending: None,
        }
    }

    /// Deterministic RNG for tests.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            quests: BTreeMap::new(),
            rng: SmallRng::seed_from_u64(seed),
            pending: None,
        }
    }

    #[must_use]
    pub fn pending_input(&self) -> Option<&PendingInput> {
        self.pending.as_ref()
    }

    pub fn take_pending_input(&mut self) -> Option<PendingInput> {
        self.pending.take()
    }

    #[must_use]
    pub fn quest(&self, id: u16) -> u16 {
        self.quests.get(&id).copied().unwrap_or(0)
    }

    pub fn set_quest(&mut self, id: u16, value: u16) {
        self.quests.insert(id, value);
    }

    /// Read a 0-terminated string-id array out of VM memory.
    fn read_id_array(vm: &Vm, base: u16) -> Vec<u16> {
        let mut ids = Vec::new();
        for index in 0..MEMORY_CELLS as u32 {
            let id = vm.get_mem(base.wrapping_add(index as u16));
            if id == 0 {
                break;
            }
            ids.push(id);
        }
        ids
    }

    fn babl_menu(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let Some(&array) = args.first() else {
            vm.set_result_register(0);
            return Ok(());
        };
        let options = Self::read_id_array(vm, array)
            .into_iter()
            .enumerate()
            .map(|(index, string_id)| MenuOption {
                number: index as u16 + 1,
                string_id,
                text: vm.get_string(string_id),
            })
            .collect();
        self.pending = Some(PendingInput::Menu { options });
        vm.suspend();
        Ok(())
    }

    fn babl_fmenu(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let (Some(&strings), Some(&flags)) = (args.first(), args.get(1)) else {
            vm.set_result_register(0);
            return Ok(());
        };
        let options = Self::read_id_array(vm, strings)
            .into_iter()
            .enumerate()
            .filter(|&(index, _)| vm.get_mem(flags.wrapping_add(index as u16)) == 1)
            .map(|(index, string_id)| MenuOption {
                number: index as u16 + 1,
                string_id,
                text: vm.get_string(string_id),
            })
            .collect();
        self.pending = Some(PendingInput::Menu { options });
        vm.suspend();
        Ok(())
    }

    fn babl_ask(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        pop_args(vm)?;
        self.pending = Some(PendingInput::Ask);
        vm.suspend();
        Ok(())
    }

    fn print(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        if let Some(&address) = args.first() {
            let id = vm.get_mem(address);
            let line = vm.get_string(id);
            vm.emit_line(line);
        }
        vm.set_result_register(0);
        Ok(())
    }

    fn compare(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let equal = match (args.first(), args.get(1)) {
            (Some(&a), Some(&b)) => {
                let first = vm.get_string_raw(vm.get_mem(a));
                let second = vm.get_string_raw(vm.get_mem(b));
                first.eq_ignore_ascii_case(&second)
            }
            _ => false,
        };
        vm.set_result_register(u16::from(equal));
        Ok(())
    }

    fn random(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let max = args.first().map_or(0, |&address| vm.get_mem(address));
        let value = if max == 0 {
            0
        } else {
            self.rng.random_range(1..=max)
        };
        vm.set_result_register(value);
        Ok(())
    }

    fn contains(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let found = match (args.first(), args.get(1)) {
            (Some(&needle), Some(&haystack)) => {
                let needle = vm.get_string_raw(vm.get_mem(needle)).to_ascii_lowercase();
                let haystack = vm
                    .get_string_raw(vm.get_mem(haystack))
                    .to_ascii_lowercase();
                haystack.contains(&needle)
            }
            _ => false,
        };
        vm.set_result_register(u16::from(found));
        Ok(())
    }

    fn length(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let length = args.first().map_or(0, |&address| {
            vm.get_string_raw(vm.get_mem(address)).len() as u16
        });
        vm.set_result_register(length);
        Ok(())
    }

    fn get_quest(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let value = args
            .first()
            .map_or(0, |&address| self.quest(vm.get_mem(address)));
        vm.set_result_register(value);
        Ok(())
    }

    fn put_quest(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        if let (Some(&id), Some(&value)) = (args.first(), args.get(1)) {
            self.set_quest(vm.get_mem(id), vm.get_mem(value));
        }
        vm.set_result_register(0);
        Ok(())
    }

    fn sex(&mut self, vm: &mut Vm) -> Result<(), VmError> {
        let args = pop_args(vm)?;
        let choice = match (args.first(), args.get(1)) {
            (Some(&male), Some(&female)) => {
                if vm.get_mem(globals::PLAY_SEX) == 0 {
                    vm.get_mem(male)
                } else {
                    vm.get_mem(female)
                }
            }
            _ => 0,
        };
        vm.set_result_register(choice);
        Ok(())
    }

    /// Consume the arguments and answer a fixed result; the
    /// inventory/barter/attitude set has no game state behind it here.
    fn stub(vm: &mut Vm, result: u16) -> Result<(), VmError> {
        pop_args(vm)?;
        vm.set_result_register(result);
        Ok(())
    }
}

pub const BABL_MENU: u16 = 0;
pub const BABL_FMENU: u16 = 1;
pub const PRINT: u16 = 2;
pub const BABL_ASK: u16 = 3;
pub const COMPARE: u16 = 4;
pub const RANDOM: u16 = 5;
pub const CONTAINS: u16 = 7;
pub const LENGTH: u16 = 11;
pub const GET_QUEST: u16 = 15;
pub const SET_QUEST: u16 = 16;
pub const SEX: u16 = 17;

impl ImportHost for StandardImports {
    fn call(&mut self, id: u16, vm: &mut Vm) -> Result<(), VmError> {
        match id {
            BABL_MENU => self.babl_menu(vm),
            BABL_FMENU => self.babl_fmenu(vm),
            PRINT => self.print(vm),
            BABL_ASK => self.babl_ask(vm),
            COMPARE => self.compare(vm),
            RANDOM => self.random(vm),
            CONTAINS => self.contains(vm),
            LENGTH => self.length(vm),
            GET_QUEST => self.get_quest(vm),
            SET_QUEST => self.put_quest(vm),
            SEX => self.sex(vm),
            // show_inv: nothing selected.
            18 => Self::stub(vm, 0),
            // give_to_npc / take_from_npc / take_id_from_npc: accepted.
            19 | 21 | 22 => Self::stub(vm, 1),
            // do_offer / do_demand: accepted.
            24 | 25 => Self::stub(vm, 1),
            // do_inv_create: dummy inventory position.
            26 => Self::stub(vm, 1000),
            // check_inv_quality: nominal quality.
            28 => Self::stub(vm, 20),
            // count_inv: nominal item count.
            30 => Self::stub(vm, 5),
            // gronk_door reports success.
            37 => Self::stub(vm, 1),
            // take_from_npc_inv: dummy object list position.
            40 => Self::stub(vm, 500),
            // x_skills: nominal skill value.
            44 => Self::stub(vm, 10),
            // The rest of the inventory/barter/attitude set consumes
            // its arguments and reports zero.
            20 | 23 | 27 | 29 | 31..=34 | 36 | 38 | 39 | 41..=43 | 45 | 47..=50 => {
                Self::stub(vm, 0)
            }
            _ => Err(VmError::UnknownImport { id, pc: vm.pc() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;
    use crate::strings::GameStrings;
    use crate::vm::machine::VmState;

    fn game_vm(strings: &[&str]) -> Vm {
        let mut vm = Vm::for_game();
        let mut store = GameStrings::new();
        store.insert_block(1, strings.iter().map(ToString::to_string).collect());
        vm.set_strings(store);
        vm
    }

    /// Store `value` in a scratch cell and leave its address plus the
    /// arg count on the stack, as compiled builtin calls do.
    fn push_value_args(vm: &mut Vm, values: &[u16]) {
        for (index, &value) in values.iter().enumerate() {
            let address = vm.bp().wrapping_add(1000 + index as u16);
            vm.set_mem(address, value);
            vm.push(address);
        }
        vm.push(values.len() as u16);
    }

    #[test]
    fn pop_args_returns_declaration_order() {
        let mut vm = Vm::for_game();
        vm.push(10);
        vm.push(20);
        vm.push(2);
        assert_eq!(pop_args(&mut vm).unwrap(), vec![10, 20]);
    }

    #[test]
    fn compare_is_case_insensitive() {
        let mut vm = game_vm(&["", "Avatar", "avatar", "troll"]);
        let mut imports = StandardImports::with_seed(1);
        push_value_args(&mut vm, &[1, 2]);
        imports.call(COMPARE, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 1);

        push_value_args(&mut vm, &[1, 3]);
        imports.call(COMPARE, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 0);
    }

    #[test]
    fn contains_checks_needle_in_haystack() {
        let mut vm = game_vm(&["", "rune", "a rune of power"]);
        let mut imports = StandardImports::with_seed(1);
        // contains(needle, haystack)
        push_value_args(&mut vm, &[1, 2]);
        imports.call(CONTAINS, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 1);
    }

    #[test]
    fn length_measures_the_string() {
        let mut vm = game_vm(&["", "sceptre"]);
        let mut imports = StandardImports::with_seed(1);
        push_value_args(&mut vm, &[1]);
        imports.call(LENGTH, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 7);
    }

    #[test]
    fn random_stays_in_range() {
        let mut vm = Vm::for_game();
        let mut imports = StandardImports::with_seed(7);
        for _ in 0..50 {
            push_value_args(&mut vm, &[6]);
            imports.call(RANDOM, &mut vm).unwrap();
            let value = vm.result_register();
            assert!((1..=6).contains(&value));
        }
    }

    #[test]
    fn quests_round_trip() {
        let mut vm = Vm::for_game();
        let mut imports = StandardImports::with_seed(1);
        push_value_args(&mut vm, &[12, 1]); // set_quest(12, 1)
        imports.call(SET_QUEST, &mut vm).unwrap();
        push_value_args(&mut vm, &[12]);
        imports.call(GET_QUEST, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 1);
        push_value_args(&mut vm, &[13]);
        imports.call(GET_QUEST, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 0);
    }

    #[test]
    fn sex_selects_by_global() {
        let mut vm = game_vm(&["", "sir", "madam"]);
        let mut imports = StandardImports::with_seed(1);
        push_value_args(&mut vm, &[1, 2]);
        imports.call(SEX, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 1);

        vm.set_mem(globals::PLAY_SEX, 1);
        push_value_args(&mut vm, &[1, 2]);
        imports.call(SEX, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 2);
    }

    #[test]
    fn menu_gathers_options_and_suspends() {
        let mut vm = game_vm(&["", "Hail", "Farewell"]);
        let mut imports = StandardImports::with_seed(1);

        // Build the 0-terminated id array the compiler would emit.
        let array = vm.bp().wrapping_add(1000);
        vm.set_mem(array, 1);
        vm.set_mem(array.wrapping_add(1), 2);
        vm.set_mem(array.wrapping_add(2), 0);
        vm.push(array);
        vm.push(1);

        imports.call(BABL_MENU, &mut vm).unwrap();
        assert_eq!(vm.state(), VmState::WaitingResponse);
        let Some(PendingInput::Menu { options }) = imports.take_pending_input() else {
            panic!("expected a pending menu");
        };
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].number, 1);
        assert_eq!(options[0].text, "Hail");
        assert_eq!(options[1].text, "Farewell");
    }

    #[test]
    fn fmenu_filters_by_flag_and_keeps_original_numbers() {
        let mut vm = game_vm(&["", "A", "B", "C"]);
        let mut imports = StandardImports::with_seed(1);

        let strings = vm.bp().wrapping_add(1000);
        let flags = vm.bp().wrapping_add(1010);
        for (index, (id, flag)) in [(1u16, 1u16), (2, 0), (3, 1)].iter().enumerate() {
            vm.set_mem(strings.wrapping_add(index as u16), *id);
            vm.set_mem(flags.wrapping_add(index as u16), *flag);
        }
        vm.set_mem(strings.wrapping_add(3), 0);

        // Pushed flags-then-strings, so pops yield strings first.
        vm.push(flags);
        vm.push(strings);
        vm.push(2);

        imports.call(BABL_FMENU, &mut vm).unwrap();
        let Some(PendingInput::Menu { options }) = imports.take_pending_input() else {
            panic!("expected a pending menu");
        };
        assert_eq!(
            options.iter().map(|o| o.number).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(
            options.iter().map(|o| o.text.as_str()).collect::<Vec<_>>(),
            vec!["A", "C"]
        );
    }

    #[test]
    fn full_menu_round_trip_through_the_vm() {
        // PUSHI_EFF 1000 twice: once to build the array, once to pass it.
        let source = "\
PUSHI_EFF 1000
PUSHI 1
SWAP
STO
PUSHI_EFF 1001
PUSHI 0
SWAP
STO
PUSHI_EFF 1000
PUSHI 1
CALLI 0
POP
PUSH_REG
PUSHI_EFF 0
SWAP
STO
EXIT_OP
";
        let mut vm = game_vm(&["", "Hail"]);
        vm.load_code(assemble(source).unwrap().code);
        let mut imports = StandardImports::with_seed(1);
        assert_eq!(vm.run(&mut imports).unwrap(), VmState::WaitingResponse);
        assert!(matches!(
            imports.pending_input(),
            Some(PendingInput::Menu { .. })
        ));
        vm.resume(1);
        assert_eq!(vm.run(&mut imports).unwrap(), VmState::Finished);
        assert_eq!(vm.get_mem(vm.bp()), 1);
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn unknown_id_fails() {
        let mut vm = Vm::for_game();
        vm.push(0);
        let err = StandardImports::with_seed(1)
            .call(6, &mut vm)
            .unwrap_err();
        assert!(matches!(err, VmError::UnknownImport { id: 6, .. }));
    }

    #[test]
    fn stubs_consume_their_arguments() {
        let mut vm = Vm::for_game();
        let mut imports = StandardImports::with_seed(1);
        let depth = vm.stack_depth();
        push_value_args(&mut vm, &[5, 6, 7]);
        imports.call(23, &mut vm).unwrap(); // identify_inv
        assert_eq!(vm.stack_depth(), depth);
        assert_eq!(vm.result_register(), 0);
    }

    #[test]
    fn gronk_door_reports_success() {
        let mut vm = Vm::for_game();
        let mut imports = StandardImports::with_seed(1);
        push_value_args(&mut vm, &[12, 14, 0]); // x, y, open/close
        imports.call(37, &mut vm).unwrap();
        assert_eq!(vm.result_register(), 1);
    }

    #[test]
    fn stubs_report_their_documented_codes() {
        let mut vm = Vm::for_game();
        let mut imports = StandardImports::with_seed(1);
        let cases = [
            (26u16, 1000u16), // do_inv_create: dummy position
            (28, 20),         // check_inv_quality: nominal quality
            (30, 5),          // count_inv: nominal item count
            (40, 500),        // take_from_npc_inv: dummy list position
            (44, 10),         // x_skills: nominal skill value
            (27, 0),          // do_inv_delete
        ];
        for (id, expected) in cases {
            push_value_args(&mut vm, &[1]);
            imports.call(id, &mut vm).unwrap();
            assert_eq!(vm.result_register(), expected, "import {id}");
        }
    }
}
