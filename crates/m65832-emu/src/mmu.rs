//! MMU: translation control state, the 16-entry TLB and the two-level
//! page-table walker.
//!
//! Translation runs for every virtual access while MMUCR.PG is set.
//! The TLB is coherent with the page tables only through the explicit
//! invalidation registers; the walker itself only ever inserts.

use crate::bus::Bus;
use crate::exception::Exception;
use crate::mem::Ram;
use crate::primitives::constants::{
    MMUCR_FAULT_MASK, MMUCR_FAULT_SHIFT, MMUCR_PG, MMUCR_WP, PTE_A, PTE_D, PTE_G, PTE_NX, PTE_P,
    PTE_PPN_MASK, PTE_U, PTE_W, TLB_ENTRIES,
};
use tracing::trace;

/// Fault-type values recorded in MMUCR bits [4:2].
pub const FAULT_L1_NOT_PRESENT: u8 = 1;
pub const FAULT_L2_NOT_PRESENT: u8 = 2;
pub const FAULT_NOT_PRESENT: u8 = 3;
pub const FAULT_WRITE_PROTECT: u8 = 4;
pub const FAULT_USER_SUPER: u8 = 5;
pub const FAULT_NO_EXECUTE: u8 = 6;

/// Access type driving the permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Fetch,
    Load,
    Store,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TlbEntry {
    pub vpn: u32,
    pub ppn: u32,
    pub asid: u8,
    pub global: bool,
    pub writable: bool,
    pub user: bool,
    pub executable: bool,
    pub accessed: bool,
    pub dirty: bool,
    pub valid: bool,
}

#[derive(Debug)]
pub struct Mmu {
    pub ptbr: u64,
    pub asid: u8,
    paging: bool,
    wp: bool,
    fault_type: u8,
    pub faultva: u32,
    tlb: [TlbEntry; TLB_ENTRIES],
    /// Round-robin victim index for the next insertion.
    tlb_next: usize,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            ptbr: 0,
            asid: 0,
            paging: false,
            wp: false,
            fault_type: 0,
            faultva: 0,
            tlb: [TlbEntry::default(); TLB_ENTRIES],
            tlb_next: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn paging_enabled(&self) -> bool {
        self.paging
    }

    /// Translate `va` for the given access. On a fault, FAULTVA and the
    /// MMUCR fault-type field are latched before the exception is
    /// returned, so the handler can read them immediately.
    pub fn translate(
        &mut self,
        bus: &mut Bus,
        va: u32,
        access: Access,
        supervisor: bool,
    ) -> Result<u32, Exception> {
        if !self.paging {
            return Ok(va);
        }

        let vpn = va >> 12;
        if let Some(idx) = self.lookup(vpn) {
            let entry = self.tlb[idx];
            self.check_entry(&entry, va, access, supervisor)?;
            // A store through a clean mapping re-walks so the dirty bit
            // lands in the in-memory PTE, not just the TLB.
            if !(access == Access::Store && !entry.dirty) {
                return Ok((entry.ppn << 12) | (va & 0xFFF));
            }
        }

        let entry = self.walk(bus, va, access, supervisor)?;
        let pa = (entry.ppn << 12) | (va & 0xFFF);
        self.insert(entry);
        Ok(pa)
    }

    /// Side-effect-free translation for debug peeking: no fault latch,
    /// no accessed/dirty updates, permissions ignored.
    pub fn probe(&self, ram: &Ram, va: u32) -> Option<u32> {
        if !self.paging {
            return Some(va);
        }
        let vpn = va >> 12;
        if let Some(idx) = self.lookup(vpn) {
            return Some((self.tlb[idx].ppn << 12) | (va & 0xFFF));
        }
        if self.ptbr == 0 {
            return None;
        }
        let l1e = ram.read64((self.ptbr as u32).wrapping_add((va >> 22) * 8));
        if l1e & PTE_P == 0 {
            return None;
        }
        let l2_base = (l1e & PTE_PPN_MASK) as u32;
        let pte = ram.read64(l2_base.wrapping_add(((va >> 12) & 0x3FF) * 8));
        if pte & PTE_P == 0 {
            return None;
        }
        Some(((pte & PTE_PPN_MASK) as u32) | (va & 0xFFF))
    }

    fn lookup(&self, vpn: u32) -> Option<usize> {
        self.tlb
            .iter()
            .position(|e| e.valid && e.vpn == vpn && (e.global || e.asid == self.asid))
    }

    fn check_entry(
        &mut self,
        entry: &TlbEntry,
        va: u32,
        access: Access,
        supervisor: bool,
    ) -> Result<(), Exception> {
        if !supervisor && !entry.user {
            return Err(self.fault(FAULT_USER_SUPER, va));
        }
        if access == Access::Store && !entry.writable && !(supervisor && !self.wp) {
            return Err(self.fault(FAULT_WRITE_PROTECT, va));
        }
        if access == Access::Fetch && !entry.executable {
            return Err(self.fault(FAULT_NO_EXECUTE, va));
        }
        Ok(())
    }

    /// Walk the two-level table. L1 index is VA[31:22], L2 index is
    /// VA[21:12]; both tables are 1024 64-bit entries.
    fn walk(
        &mut self,
        bus: &mut Bus,
        va: u32,
        access: Access,
        supervisor: bool,
    ) -> Result<TlbEntry, Exception> {
        if self.ptbr == 0 {
            return Err(self.fault(FAULT_L1_NOT_PRESENT, va));
        }

        let l1e_addr = (self.ptbr as u32).wrapping_add((va >> 22) * 8);
        let l1e = bus.read64(l1e_addr);
        if l1e & PTE_P == 0 {
            return Err(self.fault(FAULT_L2_NOT_PRESENT, va));
        }

        let l2_base = (l1e & PTE_PPN_MASK) as u32;
        let pte_addr = l2_base.wrapping_add(((va >> 12) & 0x3FF) * 8);
        let pte = bus.read64(pte_addr);
        if pte & PTE_P == 0 {
            return Err(self.fault(FAULT_NOT_PRESENT, va));
        }

        if !supervisor && pte & PTE_U == 0 {
            return Err(self.fault(FAULT_USER_SUPER, va));
        }
        if access == Access::Store && pte & PTE_W == 0 && !(supervisor && !self.wp) {
            return Err(self.fault(FAULT_WRITE_PROTECT, va));
        }
        if access == Access::Fetch && pte & PTE_NX != 0 {
            return Err(self.fault(FAULT_NO_EXECUTE, va));
        }

        // Accessed/dirty update, written back before the access commits.
        let updated = pte | PTE_A | if access == Access::Store { PTE_D } else { 0 };
        if updated != pte {
            bus.write64(pte_addr, updated);
        }

        Ok(TlbEntry {
            vpn: va >> 12,
            ppn: ((pte & PTE_PPN_MASK) as u32) >> 12,
            asid: self.asid,
            global: pte & PTE_G != 0,
            writable: pte & PTE_W != 0,
            user: pte & PTE_U != 0,
            executable: pte & PTE_NX == 0,
            accessed: true,
            dirty: updated & PTE_D != 0,
            valid: true,
        })
    }

    fn insert(&mut self, entry: TlbEntry) {
        // An existing mapping for the same VPN is refreshed in place so
        // the TLB never holds two entries for one page.
        let idx = self.lookup(entry.vpn).unwrap_or_else(|| {
            let victim = self.tlb_next;
            self.tlb_next = (self.tlb_next + 1) % TLB_ENTRIES;
            victim
        });
        self.tlb[idx] = entry;
    }

    fn fault(&mut self, kind: u8, va: u32) -> Exception {
        self.faultva = va;
        self.fault_type = kind;
        Exception::PageFault(va)
    }

    // --- System-register surface ---

    pub fn read_mmucr(&self) -> u32 {
        let mut v = 0;
        if self.paging {
            v |= MMUCR_PG;
        }
        if self.wp {
            v |= MMUCR_WP;
        }
        v | (((self.fault_type as u32) << MMUCR_FAULT_SHIFT) & MMUCR_FAULT_MASK)
    }

    pub fn write_mmucr(&mut self, value: u32) {
        self.paging = value & MMUCR_PG != 0;
        self.wp = value & MMUCR_WP != 0;
        self.fault_type = ((value & MMUCR_FAULT_MASK) >> MMUCR_FAULT_SHIFT) as u8;
    }

    pub fn fault_type(&self) -> u8 {
        self.fault_type
    }

    /// Invalidate any entry mapping the page of `va`, in every ASID.
    pub fn invalidate_va(&mut self, va: u32) {
        let vpn = va >> 12;
        trace!(va = format_args!("{va:#010x}"), "tlb invalidate va");
        for entry in self.tlb.iter_mut() {
            if entry.vpn == vpn {
                entry.valid = false;
            }
        }
    }

    /// Invalidate all non-global entries of one ASID.
    pub fn invalidate_asid(&mut self, asid: u8) {
        trace!(asid, "tlb invalidate asid");
        for entry in self.tlb.iter_mut() {
            if !entry.global && entry.asid == asid {
                entry.valid = false;
            }
        }
    }

    pub fn flush(&mut self) {
        trace!("tlb flush");
        for entry in self.tlb.iter_mut() {
            entry.valid = false;
        }
    }

    /// Test/debug view of a TLB slot.
    pub fn tlb_entry(&self, index: usize) -> &TlbEntry {
        &self.tlb[index % TLB_ENTRIES]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::constants::PTE_G;

    fn map(bus: &mut Bus, ptbr: u32, va: u32, pa: u32, flags: u64) {
        let l1e_addr = ptbr + (va >> 22) * 8;
        let l2_base = 0x4000u32;
        bus.write64(l1e_addr, l2_base as u64 | PTE_P);
        bus.write64(l2_base + ((va >> 12) & 0x3FF) * 8, pa as u64 | flags);
    }

    #[test]
    fn round_robin_replacement() {
        let mut mmu = Mmu::new();
        let mut bus = Bus::new(0x100000);
        mmu.ptbr = 0x2000;
        mmu.write_mmucr(MMUCR_PG);
        // Fill all 16 slots plus one more; the 17th insert evicts slot 0.
        for i in 0..17u32 {
            map(&mut bus, 0x2000, i << 12, 0x10000 + (i << 12), PTE_P | PTE_W | PTE_U);
            mmu.translate(&mut bus, i << 12, Access::Load, true).unwrap();
        }
        assert_eq!(mmu.tlb_entry(0).vpn, 16);
        assert_eq!(mmu.tlb_entry(1).vpn, 1);
    }

    #[test]
    fn global_entries_ignore_asid() {
        let mut mmu = Mmu::new();
        let mut bus = Bus::new(0x100000);
        mmu.ptbr = 0x2000;
        mmu.write_mmucr(MMUCR_PG);
        map(&mut bus, 0x2000, 0x5000, 0x10000, PTE_P | PTE_U | PTE_G);
        mmu.translate(&mut bus, 0x5000, Access::Load, true).unwrap();
        // Remove the page table; a hit must still come from the TLB
        // under a different ASID because the entry is global.
        bus.write64(0x2000 + 0 * 8, 0);
        mmu.asid = 7;
        assert_eq!(mmu.translate(&mut bus, 0x5004, Access::Load, true), Ok(0x10004));
    }
}
