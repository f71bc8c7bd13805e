//! Virtual machine that runs the bytecode

use log::{debug, info, trace};

use crate::bytecode::{Opcode, Program, WORD};
use crate::error::VmError;
use crate::memory::Memory;
use crate::syscall::{format_printf, Host};

/// `printf` receives its format plus at most this many arguments.
const PRINTF_MAX_ARGS: usize = 5;

/// Sizes of the runtime memory regions, in bytes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VmConfig {
    pub heap_size: usize,
    pub stack_size: usize,
}

impl VmConfig {
    pub const DEFAULT_POOL_SIZE: usize = 256 * 1024;

    /// Use `pool_size` bytes for both the heap and the stack.
    pub fn with_pool_size(pool_size: usize) -> Self {
        VmConfig {
            heap_size: pool_size,
            stack_size: pool_size,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::with_pool_size(Self::DEFAULT_POOL_SIZE)
    }
}

/// Snapshot of the VM registers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Registers {
    pub pc: usize,
    pub bp: i64,
    pub sp: i64,
    pub ax: i64,
}

/// Virtual machine representation
pub struct Vm<'p, H: Host> {
    program: &'p Program,
    memory: Memory,
    host: H,

    pc: usize, // program counter, index into the code buffer
    bp: i64,   // frame pointer
    sp: i64,   // stack pointer, the stack grows down
    ax: i64,   // accumulator
    op_pc: usize,        // position of the instruction being executed
    cycle: u64,          // executed instructions
    pub halt: Option<i64>, // halt flag with exit code

    heap_next: i64, // next free heap byte
    heap_end: i64,  // first byte of the stack region
}

type VmResult<T> = Result<T, VmError>;

impl<'p, H: Host> Vm<'p, H> {
    /// Lay out memory for `program` and prepare the call `main(argc, argv)`.
    pub fn load(program: &'p Program, args: &[&str], host: H, config: VmConfig) -> VmResult<Self> {
        let data_end = program.data.len() as i64;
        let heap_end = data_end + config.heap_size as i64;
        let size = heap_end as usize + config.stack_size;

        let mut vm = Vm {
            program,
            memory: Memory::new(&program.data, size),
            host,
            pc: program.entry,
            bp: size as i64,
            sp: size as i64,
            ax: 0,
            op_pc: program.entry,
            cycle: 0,
            halt: None,
            heap_next: data_end,
            heap_end,
        };
        debug!(
            "memory: data 0..{}, heap {}..{}, stack {}..{}",
            data_end, data_end, heap_end, heap_end, size
        );

        let mut argv = Vec::with_capacity(args.len());
        for arg in args {
            let addr = vm.alloc(arg.len() as i64 + 1).ok_or(VmError::OutOfMemory)?;
            vm.write_bytes(addr, arg.as_bytes())?;
            argv.push(addr);
        }
        let argv_addr = vm
            .alloc(argv.len() as i64 * WORD)
            .ok_or(VmError::OutOfMemory)?;
        for (i, &addr) in argv.iter().enumerate() {
            vm.store_word(argv_addr + i as i64 * WORD, addr)?;
        }

        vm.push(args.len() as i64)?;
        vm.push(argv_addr)?;
        // `main` returns into the exit stub
        vm.push(program.exit_stub as i64)?;
        debug!("entry {}, argc {}", program.entry, args.len());

        Ok(vm)
    }

    /// Run until the program exits, returning its exit code.
    pub fn run(&mut self) -> VmResult<i64> {
        if let Some(code) = self.halt {
            return Err(VmError::AlreadyExited(code));
        }

        loop {
            self.next_instruction()?;
            if let Some(code) = self.halt {
                return Ok(code);
            }
        }
    }

    /// Fetch, decode and execute a single instruction.
    pub fn next_instruction(&mut self) -> VmResult<()> {
        if let Some(code) = self.halt {
            return Err(VmError::AlreadyExited(code));
        }

        let pc = self.pc;
        let word = *self
            .program
            .code
            .get(pc)
            .ok_or(VmError::PcOutOfRange { pc })?;
        let op = Opcode::from_word(word).ok_or(VmError::UnknownOpcode { word, pc })?;
        self.op_pc = pc;
        self.pc += 1;
        self.cycle += 1;

        if log::log_enabled!(log::Level::Trace) {
            match self.program.code.get(self.pc) {
                Some(operand) if op.has_operand() => trace!(
                    "{:>8} {:>6}: {:<4} {:<8} ax={} sp={}",
                    self.cycle, pc, op, operand, self.ax, self.sp
                ),
                _ => trace!(
                    "{:>8} {:>6}: {:<4} {:<8} ax={} sp={}",
                    self.cycle, pc, op, "", self.ax, self.sp
                ),
            }
        }

        match op {
            Opcode::Imm => self.ax = self.operand()?,
            Opcode::Lea => {
                let n = self.operand()?;
                self.ax = self.bp + n * WORD;
            }
            Opcode::Jmp => self.pc = self.jump_target()?,
            Opcode::Call => {
                let target = self.jump_target()?;
                self.push(self.pc as i64)?;
                self.pc = target;
            }
            Opcode::Jz => {
                let target = self.jump_target()?;
                if self.ax == 0 {
                    self.pc = target;
                }
            }
            Opcode::Jnz => {
                let target = self.jump_target()?;
                if self.ax != 0 {
                    self.pc = target;
                }
            }
            Opcode::Ent => {
                let locals = self.operand()?;
                self.push(self.bp)?;
                self.bp = self.sp;
                self.sp -= locals * WORD;
                if self.sp < self.heap_end {
                    return Err(VmError::StackOverflow { pc });
                }
            }
            Opcode::Adj => {
                let n = self.operand()?;
                self.sp += n * WORD;
            }
            Opcode::Lev => {
                self.sp = self.bp;
                self.bp = self.pop()?;
                self.pc = self.pop()? as usize;
            }
            Opcode::Li => self.ax = self.load_word(self.ax)?,
            Opcode::Lc => self.ax = self.load_byte(self.ax)? as i8 as i64,
            Opcode::Si => {
                let addr = self.pop()?;
                self.store_word(addr, self.ax)?;
            }
            Opcode::Sc => {
                let addr = self.pop()?;
                self.memory
                    .store_byte(addr, self.ax as u8)
                    .ok_or(VmError::SegFault { addr, pc })?;
            }
            Opcode::Push => self.push(self.ax)?,
            Opcode::Or
            | Opcode::Xor
            | Opcode::And
            | Opcode::Eq
            | Opcode::Ne
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Le
            | Opcode::Ge
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod => {
                let lhs = self.pop()?;
                self.ax = self.binary(op, lhs, self.ax)?;
            }
            Opcode::Open => self.sys_open()?,
            Opcode::Read => self.sys_read()?,
            Opcode::Clos => {
                let fd = self.stack_arg(0)?;
                self.ax = self.host.close(fd);
            }
            Opcode::Prtf => self.sys_printf()?,
            Opcode::Malc => {
                let size = self.stack_arg(0)?;
                self.ax = self.alloc(size).unwrap_or(0);
            }
            Opcode::Mset => self.sys_memset()?,
            Opcode::Mcmp => self.sys_memcmp()?,
            Opcode::Exit => {
                let code = self.stack_arg(0)?;
                info!("exit({}) cycle = {}", code, self.cycle);
                self.halt = Some(code);
            }
        }

        Ok(())
    }

    pub fn registers(&self) -> Registers {
        Registers {
            pc: self.pc,
            bp: self.bp,
            sp: self.sp,
            ax: self.ax,
        }
    }

    /// Number of instructions executed so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    fn binary(&self, op: Opcode, lhs: i64, rhs: i64) -> VmResult<i64> {
        let value = match op {
            Opcode::Or => lhs | rhs,
            Opcode::Xor => lhs ^ rhs,
            Opcode::And => lhs & rhs,
            Opcode::Eq => (lhs == rhs) as i64,
            Opcode::Ne => (lhs != rhs) as i64,
            Opcode::Lt => (lhs < rhs) as i64,
            Opcode::Gt => (lhs > rhs) as i64,
            Opcode::Le => (lhs <= rhs) as i64,
            Opcode::Ge => (lhs >= rhs) as i64,
            Opcode::Shl => lhs.wrapping_shl(rhs as u32),
            Opcode::Shr => lhs.wrapping_shr(rhs as u32),
            Opcode::Add => lhs.wrapping_add(rhs),
            Opcode::Sub => lhs.wrapping_sub(rhs),
            Opcode::Mul => lhs.wrapping_mul(rhs),
            Opcode::Div | Opcode::Mod if rhs == 0 => {
                return Err(VmError::DivisionByZero { pc: self.op_pc, op })
            }
            Opcode::Div => lhs.wrapping_div(rhs),
            Opcode::Mod => lhs.wrapping_rem(rhs),
            _ => {
                return Err(VmError::UnknownOpcode {
                    word: op as i64,
                    pc: self.op_pc,
                })
            }
        };
        Ok(value)
    }

    /// Read the operand word following the current opcode.
    fn operand(&mut self) -> VmResult<i64> {
        let operand = *self
            .program
            .code
            .get(self.pc)
            .ok_or(VmError::PcOutOfRange { pc: self.pc })?;
        self.pc += 1;
        Ok(operand)
    }

    fn jump_target(&mut self) -> VmResult<usize> {
        let target = self.operand()?;
        usize::try_from(target)
            .ok()
            .filter(|&target| target < self.program.code.len())
            .ok_or(VmError::PcOutOfRange {
                pc: target as usize,
            })
    }

    fn push(&mut self, value: i64) -> VmResult<()> {
        if self.sp - WORD < self.heap_end {
            return Err(VmError::StackOverflow { pc: self.op_pc });
        }
        self.sp -= WORD;
        self.store_word(self.sp, value)
    }

    fn pop(&mut self) -> VmResult<i64> {
        let value = self.load_word(self.sp)?;
        self.sp += WORD;
        Ok(value)
    }

    /// Syscall argument `index` counted from the last one pushed.
    fn stack_arg(&self, index: i64) -> VmResult<i64> {
        self.load_word(self.sp + index * WORD)
    }

    fn segfault(&self, addr: i64) -> VmError {
        VmError::SegFault {
            addr,
            pc: self.op_pc,
        }
    }

    fn load_word(&self, addr: i64) -> VmResult<i64> {
        self.memory
            .load_word(addr)
            .ok_or_else(|| self.segfault(addr))
    }

    fn load_byte(&self, addr: i64) -> VmResult<u8> {
        self.memory
            .load_byte(addr)
            .ok_or_else(|| self.segfault(addr))
    }

    fn store_word(&mut self, addr: i64, value: i64) -> VmResult<()> {
        let pc = self.op_pc;
        self.memory
            .store_word(addr, value)
            .ok_or(VmError::SegFault { addr, pc })
    }

    fn write_bytes(&mut self, addr: i64, bytes: &[u8]) -> VmResult<()> {
        let pc = self.op_pc;
        self.memory
            .slice_mut(addr, bytes.len() as i64)
            .ok_or(VmError::SegFault { addr, pc })?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Bump allocation from the heap, word aligned. `None` when exhausted.
    fn alloc(&mut self, size: i64) -> Option<i64> {
        if size < 0 {
            return None;
        }
        let addr = self.heap_next;
        let end = addr.checked_add(size)?;
        let next = end.checked_add(WORD - 1)? & !(WORD - 1);
        if end > self.heap_end {
            return None;
        }
        self.heap_next = next.min(self.heap_end);
        Some(addr)
    }

    /// `open(path, flags)`
    fn sys_open(&mut self) -> VmResult<()> {
        let path_addr = self.stack_arg(1)?;
        let flags = self.stack_arg(0)?;
        let path = self
            .memory
            .c_str(path_addr)
            .ok_or_else(|| self.segfault(path_addr))?;
        let path = String::from_utf8_lossy(path).into_owned();
        self.ax = self.host.open(&path, flags);
        Ok(())
    }

    /// `read(fd, buf, count)`
    fn sys_read(&mut self) -> VmResult<()> {
        let fd = self.stack_arg(2)?;
        let addr = self.stack_arg(1)?;
        let count = self.stack_arg(0)?;
        let pc = self.op_pc;
        let buf = self
            .memory
            .slice_mut(addr, count)
            .ok_or(VmError::SegFault { addr, pc })?;
        self.ax = self.host.read(fd, buf);
        Ok(())
    }

    /// `printf(format, ...)`. The argument count is taken from the `ADJ`
    /// that follows the call.
    fn sys_printf(&mut self) -> VmResult<()> {
        let code = &self.program.code;
        let argc = match code.get(self.pc) {
            Some(&word) if word == Opcode::Adj as i64 => {
                code.get(self.pc + 1).copied().unwrap_or(0)
            }
            _ => 0,
        };
        if argc < 1 {
            self.ax = 0;
            return Ok(());
        }

        let base = self.sp + argc * WORD;
        let format_addr = self.load_word(base - WORD)?;
        let mut args = Vec::with_capacity(PRINTF_MAX_ARGS);
        for i in 2..=(argc.min(PRINTF_MAX_ARGS as i64 + 1)) {
            args.push(self.load_word(base - i * WORD)?);
        }

        let format = self
            .memory
            .c_str(format_addr)
            .ok_or_else(|| self.segfault(format_addr))?;
        let out = format_printf(format, &args, &self.memory).map_err(|addr| self.segfault(addr))?;
        self.ax = self.host.write(&out);
        Ok(())
    }

    /// `memset(dest, value, count)`
    fn sys_memset(&mut self) -> VmResult<()> {
        let addr = self.stack_arg(2)?;
        let value = self.stack_arg(1)?;
        let count = self.stack_arg(0)?;
        let pc = self.op_pc;
        self.memory
            .slice_mut(addr, count)
            .ok_or(VmError::SegFault { addr, pc })?
            .fill(value as u8);
        self.ax = addr;
        Ok(())
    }

    /// `memcmp(a, b, count)`
    fn sys_memcmp(&mut self) -> VmResult<()> {
        let a = self.stack_arg(2)?;
        let b = self.stack_arg(1)?;
        let count = self.stack_arg(0)?;
        let lhs = self.memory.slice(a, count).ok_or_else(|| self.segfault(a))?;
        let rhs = self.memory.slice(b, count).ok_or_else(|| self.segfault(b))?;
        self.ax = lhs
            .iter()
            .zip(rhs)
            .find(|(x, y)| x != y)
            .map_or(0, |(&x, &y)| x as i64 - y as i64);
        Ok(())
    }
}
