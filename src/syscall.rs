//! Host side of the syscalls.
//!
//! `malloc`, `memset` and `memcmp` only touch VM memory and are handled by the
//! VM itself. Everything that reaches outside the VM goes through [`Host`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};

use log::debug;

use crate::memory::Memory;

const O_ACCMODE: i64 = 0o3;
const O_WRONLY: i64 = 0o1;
const O_RDWR: i64 = 0o2;
const O_CREAT: i64 = 0o100;
const O_TRUNC: i64 = 0o1000;
const O_APPEND: i64 = 0o2000;

/// I/O operations a running program may perform.
///
/// Return values follow the C library: a negative value signals failure.
pub trait Host {
    /// Open `path` with POSIX style `flags`, returning a file descriptor.
    fn open(&mut self, path: &str, flags: i64) -> i64;
    /// Read up to `buf.len()` bytes, returning the count read.
    fn read(&mut self, fd: i64, buf: &mut [u8]) -> i64;
    fn close(&mut self, fd: i64) -> i64;
    /// Output of `printf`.
    fn write(&mut self, bytes: &[u8]) -> i64;
}

/// Host backed by the real file system and standard streams.
#[derive(Debug)]
pub struct StdHost {
    files: HashMap<i64, File>,
    next_fd: i64,
}

impl StdHost {
    pub fn new() -> Self {
        StdHost {
            files: HashMap::new(),
            next_fd: 3,
        }
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for StdHost {
    fn open(&mut self, path: &str, flags: i64) -> i64 {
        let mut options = OpenOptions::new();
        match flags & O_ACCMODE {
            O_WRONLY => options.write(true),
            O_RDWR => options.read(true).write(true),
            _ => options.read(true),
        };
        options
            .create(flags & O_CREAT != 0)
            .truncate(flags & O_TRUNC != 0)
            .append(flags & O_APPEND != 0);

        match options.open(path) {
            Ok(file) => {
                let fd = self.next_fd;
                self.next_fd += 1;
                self.files.insert(fd, file);
                fd
            }
            Err(e) => {
                debug!("open({}) failed: {}", path, e);
                -1
            }
        }
    }

    fn read(&mut self, fd: i64, buf: &mut [u8]) -> i64 {
        let result = match fd {
            0 => io::stdin().read(buf),
            _ => match self.files.get_mut(&fd) {
                Some(file) => file.read(buf),
                None => return -1,
            },
        };
        match result {
            Ok(n) => n as i64,
            Err(e) => {
                debug!("read({}) failed: {}", fd, e);
                -1
            }
        }
    }

    fn close(&mut self, fd: i64) -> i64 {
        match self.files.remove(&fd) {
            Some(_) => 0,
            None => -1,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> i64 {
        let mut stdout = io::stdout().lock();
        match stdout.write_all(bytes).and_then(|_| stdout.flush()) {
            Ok(()) => bytes.len() as i64,
            Err(_) => -1,
        }
    }
}

/// In-memory host: captures output and serves reads from registered files.
#[derive(Debug, Default)]
pub struct BufferHost {
    pub output: Vec<u8>,
    files: HashMap<String, Vec<u8>>,
    open: HashMap<i64, (Vec<u8>, usize)>,
    next_fd: i64,
}

impl BufferHost {
    pub fn new() -> Self {
        BufferHost {
            next_fd: 3,
            ..Default::default()
        }
    }

    /// Make `contents` readable under `path`.
    pub fn with_file(mut self, path: &str, contents: &[u8]) -> Self {
        self.files.insert(path.to_string(), contents.to_vec());
        self
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Host for BufferHost {
    fn open(&mut self, path: &str, flags: i64) -> i64 {
        if flags & O_ACCMODE != 0 {
            return -1;
        }
        match self.files.get(path) {
            Some(contents) => {
                let fd = self.next_fd;
                self.next_fd += 1;
                self.open.insert(fd, (contents.clone(), 0));
                fd
            }
            None => -1,
        }
    }

    fn read(&mut self, fd: i64, buf: &mut [u8]) -> i64 {
        let (contents, pos) = match self.open.get_mut(&fd) {
            Some(file) => file,
            None => return -1,
        };
        let n = buf.len().min(contents.len() - *pos);
        buf[..n].copy_from_slice(&contents[*pos..*pos + n]);
        *pos += n;
        n as i64
    }

    fn close(&mut self, fd: i64) -> i64 {
        match self.open.remove(&fd) {
            Some(_) => 0,
            None => -1,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> i64 {
        self.output.extend_from_slice(bytes);
        bytes.len() as i64
    }
}

/// Render a `printf` format string. `%s` arguments are read from `memory`;
/// an unreadable one is returned as the error.
pub fn format_printf(format: &[u8], args: &[i64], memory: &Memory) -> Result<Vec<u8>, i64> {
    let mut out = Vec::new();
    let mut args = args.iter().copied();
    let mut i = 0;

    while i < format.len() {
        let ch = format[i];
        i += 1;
        if ch != b'%' {
            out.push(ch);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = format.get(i) {
            match flag {
                b'-' => spec.left = true,
                b'0' => spec.zero = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        if format.get(i) == Some(&b'*') {
            i += 1;
            let width = args.next().unwrap_or(0);
            spec.left |= width < 0;
            spec.width = width.unsigned_abs() as usize;
        } else {
            spec.width = read_count(format, &mut i);
        }
        if format.get(i) == Some(&b'.') {
            i += 1;
            spec.precision = Some(if format.get(i) == Some(&b'*') {
                i += 1;
                args.next().unwrap_or(0).max(0) as usize
            } else {
                read_count(format, &mut i)
            });
        }
        while matches!(format.get(i), Some(b'l' | b'h' | b'z')) {
            i += 1;
        }

        let conversion = match format.get(i) {
            Some(&conversion) => conversion,
            None => {
                out.push(b'%');
                break;
            }
        };
        i += 1;

        match conversion {
            b'%' => out.push(b'%'),
            b'd' | b'i' => {
                let value = args.next().unwrap_or(0);
                let sign = if value < 0 {
                    "-"
                } else if spec.plus {
                    "+"
                } else if spec.space {
                    " "
                } else {
                    ""
                };
                spec.number(&mut out, sign, value.unsigned_abs().to_string());
            }
            b'u' => spec.number(&mut out, "", (args.next().unwrap_or(0) as u64).to_string()),
            b'x' | b'X' | b'o' | b'p' => {
                let value = args.next().unwrap_or(0) as u64;
                let (prefix, digits) = match conversion {
                    b'x' => (if spec.alternate { "0x" } else { "" }, format!("{:x}", value)),
                    b'X' => (if spec.alternate { "0X" } else { "" }, format!("{:X}", value)),
                    b'o' => (if spec.alternate { "0" } else { "" }, format!("{:o}", value)),
                    _ => ("0x", format!("{:x}", value)),
                };
                spec.number(&mut out, prefix, digits);
            }
            b'c' => {
                let value = args.next().unwrap_or(0) as u8;
                spec.pad(&mut out, &[value]);
            }
            b's' => {
                let addr = args.next().unwrap_or(0);
                let mut text = memory.c_str(addr).ok_or(addr)?;
                if let Some(precision) = spec.precision {
                    text = &text[..text.len().min(precision)];
                }
                spec.pad(&mut out, text);
            }
            other => {
                out.push(b'%');
                out.push(other);
            }
        }
    }

    Ok(out)
}

fn read_count(format: &[u8], i: &mut usize) -> usize {
    let mut count = 0usize;
    while let Some(digit) = format.get(*i).filter(|b| b.is_ascii_digit()) {
        count = count.saturating_mul(10).saturating_add((digit - b'0') as usize);
        *i += 1;
    }
    count
}

/// Flags, width and precision of one conversion.
#[derive(Debug, Default)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    fn pad(&self, out: &mut Vec<u8>, text: &[u8]) {
        let fill = self.width.saturating_sub(text.len());
        if !self.left {
            out.extend(std::iter::repeat(b' ').take(fill));
        }
        out.extend_from_slice(text);
        if self.left {
            out.extend(std::iter::repeat(b' ').take(fill));
        }
    }

    fn number(&self, out: &mut Vec<u8>, prefix: &str, mut digits: String) {
        if let Some(precision) = self.precision {
            if digits.len() < precision {
                digits = "0".repeat(precision - digits.len()) + &digits;
            }
        }

        let len = prefix.len() + digits.len();
        if self.zero && !self.left && self.precision.is_none() && len < self.width {
            out.extend_from_slice(prefix.as_bytes());
            out.extend(std::iter::repeat(b'0').take(self.width - len));
            out.extend_from_slice(digits.as_bytes());
        } else {
            self.pad(out, format!("{}{}", prefix, digits).as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printf(format: &str, args: &[i64]) -> String {
        let memory = Memory::new(b"\0\0\0\0\0\0\0\0world\0", 64);
        String::from_utf8(format_printf(format.as_bytes(), args, &memory).unwrap()).unwrap()
    }

    #[test]
    fn conversions() {
        assert_eq!(printf("%d + %i = %d\n", &[1, 2, 3]), "1 + 2 = 3\n");
        assert_eq!(printf("%d", &[-42]), "-42");
        assert_eq!(printf("%u", &[-1]), "18446744073709551615");
        assert_eq!(printf("%x %X %o", &[255, 255, 8]), "ff FF 10");
        assert_eq!(printf("%c%c", &[b'o' as i64, b'k' as i64]), "ok");
        assert_eq!(printf("hello %s!", &[8]), "hello world!");
        assert_eq!(printf("100%%", &[]), "100%");
        assert_eq!(printf("%ld", &[7]), "7");
        assert_eq!(printf("%q", &[]), "%q");
    }

    #[test]
    fn width_and_precision() {
        assert_eq!(printf("[%5d]", &[42]), "[   42]");
        assert_eq!(printf("[%-5d]", &[42]), "[42   ]");
        assert_eq!(printf("[%05d]", &[-42]), "[-0042]");
        assert_eq!(printf("[%.3d]", &[7]), "[007]");
        assert_eq!(printf("[%8.3s]", &[8]), "[     wor]");
        assert_eq!(printf("[%*d]", &[4, 1]), "[   1]");
        assert_eq!(printf("[%#x]", &[255]), "[0xff]");
    }

    #[test]
    fn missing_arguments_are_zero() {
        assert_eq!(printf("%d %d", &[1]), "1 0");
    }

    #[test]
    fn bad_string_address() {
        let memory = Memory::new(&[], 8);
        assert_eq!(format_printf(b"%s", &[100], &memory), Err(100));
    }

    #[test]
    fn buffer_host_files() {
        let mut host = BufferHost::new().with_file("in.txt", b"abcdef");
        assert_eq!(host.open("missing", 0), -1);
        assert_eq!(host.open("in.txt", 1), -1);

        let fd = host.open("in.txt", 0);
        assert!(fd >= 3);
        let mut buf = [0; 4];
        assert_eq!(host.read(fd, &mut buf), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(host.read(fd, &mut buf), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(host.read(fd, &mut buf), 0);
        assert_eq!(host.close(fd), 0);
        assert_eq!(host.close(fd), -1);

        assert_eq!(host.write(b"hi"), 2);
        assert_eq!(host.output_str(), "hi");
    }
}
