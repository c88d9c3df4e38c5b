use std::ops::Add;

/// An index into a byte within an ELF file.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Offset(pub u64);

/// A kernel virtual address as recorded in a program header.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct VirtualAddr(pub u64);

/// A physical address, i.e. where the bytes lived in RAM when the dump was taken.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct PhysAddr(pub u64);

/// A range of bytes that can be addressed using offsets into an ELF file, virtual
/// addresses, or physical addresses. Bytes within load segments can be addressed all
/// three ways.
#[derive(Copy, Clone, Debug)]
pub struct Bytes<A>
where
    A: Add<u64, Output = A> + Copy + Ord,
{
    pub start: A,
    pub size: u64,
}

impl<A: Add<u64, Output = A> + Copy + Ord> Bytes<A> {
    pub fn new(start: A, size: u64) -> Self {
        Bytes { start, size }
    }

    pub fn contains(&self, addr: A) -> bool {
        addr >= self.start && addr < self.end()
    }

    pub fn end(&self) -> A {
        self.start + self.size
    }
}

impl Add<u64> for Offset {
    type Output = Offset;

    fn add(self, rhs: u64) -> Self::Output {
        Offset(self.0.wrapping_add(rhs))
    }
}

impl Add<u64> for VirtualAddr {
    type Output = VirtualAddr;

    fn add(self, rhs: u64) -> Self::Output {
        VirtualAddr(self.0.wrapping_add(rhs))
    }
}

impl Add<u64> for PhysAddr {
    type Output = PhysAddr;

    fn add(self, rhs: u64) -> Self::Output {
        PhysAddr(self.0.wrapping_add(rhs))
    }
}
