//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ELF 文件格式解析
//!
//! 对应 Linux 的 ELF 加载器 (fs/binfmt_elf.c) 中解析部分，只接受：
//! - 64-bit ELF (ELF64)
//! - 小端序 (Little Endian)
//! - x86_64 可执行文件 (ET_EXEC)

use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr;

use crate::errno::Errno;
use crate::mm::MapFlags;

/// ELF 识别 magic number
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;

/// 可执行文件
pub const ET_EXEC: u16 = 2;
/// AMD x86-64
pub const EM_X86_64: u16 = 62;
/// 可加载段
pub const PT_LOAD: u32 = 1;

/// 程序头段标志
pub const PF_X: u32 = 0x1; // 可执行
pub const PF_W: u32 = 0x2; // 可写
pub const PF_R: u32 = 0x4; // 可读

/// ELF 文件头 (64-bit)
///
/// 对应 Elf64_Ehdr (include/uapi/linux/elf.h)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Ehdr {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    /// 入口点地址
    pub e_entry: u64,
    /// 程序头表偏移
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    /// 程序头表条目大小
    pub e_phentsize: u16,
    /// 程序头表条目数量
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// 程序头
///
/// 对应 Elf64_Phdr (include/uapi/linux/elf.h)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// 一个可加载段
#[derive(Debug, Clone, Copy)]
pub struct LoadSegment<'a> {
    pub vaddr: u64,
    /// 文件中的内容 (p_filesz 字节)
    pub data: &'a [u8],
    /// 内存中的大小，超出 data 的部分清零 (.bss)
    pub mem_size: u64,
    pub flags: MapFlags,
}

/// 解析后的可执行映像
#[derive(Debug)]
pub struct ElfImage<'a> {
    pub entry: u64,
    pub segments: Vec<LoadSegment<'a>>,
}

impl Elf64Phdr {
    /// 段是否可加载
    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }

    /// 转换为用户态映射权限
    pub fn map_flags(&self) -> MapFlags {
        let mut flags = MapFlags::USER;
        if self.p_flags & PF_R != 0 {
            flags |= MapFlags::READ;
        }
        if self.p_flags & PF_W != 0 {
            flags |= MapFlags::WRITE;
        }
        if self.p_flags & PF_X != 0 {
            flags |= MapFlags::EXEC;
        }
        flags
    }
}

impl<'a> ElfImage<'a> {
    /// 校验并解析 ELF 映像
    ///
    /// 任何格式问题都返回 `Errno::ExecFormatError`
    pub fn parse(data: &'a [u8]) -> Result<Self, Errno> {
        if data.len() < size_of::<Elf64Ehdr>() {
            return Err(Errno::ExecFormatError);
        }
        // 使用 read_unaligned 避免对齐问题
        let ehdr = unsafe { ptr::read_unaligned(data.as_ptr() as *const Elf64Ehdr) };

        let ident = &ehdr.e_ident;
        if ident[0..4] != ELF_MAGIC
            || ident[4] != ELFCLASS64
            || ident[5] != ELFDATA2LSB
            || ident[6] != EV_CURRENT
        {
            return Err(Errno::ExecFormatError);
        }
        if ehdr.e_type != ET_EXEC || ehdr.e_machine != EM_X86_64 {
            return Err(Errno::ExecFormatError);
        }
        if ehdr.e_phnum > 0 && (ehdr.e_phentsize as usize) < size_of::<Elf64Phdr>() {
            return Err(Errno::ExecFormatError);
        }

        let phoff = ehdr.e_phoff as usize;
        let phentsize = ehdr.e_phentsize as usize;
        let table_end = (ehdr.e_phnum as usize)
            .checked_mul(phentsize)
            .and_then(|size| size.checked_add(phoff))
            .ok_or(Errno::ExecFormatError)?;
        if table_end > data.len() {
            return Err(Errno::ExecFormatError);
        }

        let mut segments = Vec::new();
        for i in 0..ehdr.e_phnum as usize {
            let offset = phoff + i * phentsize;
            let phdr = unsafe { ptr::read_unaligned(data.as_ptr().add(offset) as *const Elf64Phdr) };
            if !phdr.is_load() {
                continue;
            }
            if phdr.p_filesz > phdr.p_memsz {
                return Err(Errno::ExecFormatError);
            }
            let start = usize::try_from(phdr.p_offset).map_err(|_| Errno::ExecFormatError)?;
            let len = usize::try_from(phdr.p_filesz).map_err(|_| Errno::ExecFormatError)?;
            let end = start.checked_add(len).ok_or(Errno::ExecFormatError)?;
            let bytes = data.get(start..end).ok_or(Errno::ExecFormatError)?;
            segments.push(LoadSegment {
                vaddr: phdr.p_vaddr,
                data: bytes,
                mem_size: phdr.p_memsz,
                flags: phdr.map_flags(),
            });
        }

        if segments.is_empty() {
            return Err(Errno::ExecFormatError);
        }

        Ok(Self { entry: ehdr.e_entry, segments })
    }
}
