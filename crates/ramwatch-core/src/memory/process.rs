//! Live emulator process access.
//!
//! Memory is read and written with `ReadProcessMemory`/`WriteProcessMemory`.
//! Pausing suspends every thread of the process and resuming undoes exactly
//! the suspensions that succeeded.

use std::time::{Duration, Instant};

#[cfg(target_os = "windows")]
use std::sync::Mutex;

use tracing::{debug, warn};

use super::{ForeignProcess, ProcessControl, ReadMemory, WriteMemory};
use crate::error::{Error, Result};

/// Summary of a running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Handle to an attached emulator process
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    #[cfg(target_os = "windows")]
    handle: windows::Win32::Foundation::HANDLE,
    /// Thread ids suspended by the current pause, so resume undoes exactly those
    #[cfg(target_os = "windows")]
    suspended: Mutex<Vec<u32>>,
}

// SAFETY: process HANDLEs are process-wide and usable from any thread.
#[cfg(target_os = "windows")]
unsafe impl Send for ProcessHandle {}
#[cfg(target_os = "windows")]
unsafe impl Sync for ProcessHandle {}

#[cfg(target_os = "windows")]
impl ProcessHandle {
    /// Open a process by id with read/write/query access
    pub fn open(pid: u32) -> Result<Self> {
        use windows::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_SYNCHRONIZE, PROCESS_VM_OPERATION,
            PROCESS_VM_READ, PROCESS_VM_WRITE,
        };

        let name = list_processes()?
            .into_iter()
            .find(|p| p.pid == pid)
            .map(|p| p.name)
            .ok_or_else(|| Error::ProcessNotFound(format!("pid {}", pid)))?;

        // SAFETY: OpenProcess returns a new handle owned by this struct and closed on drop.
        let handle = unsafe {
            OpenProcess(
                PROCESS_VM_READ
                    | PROCESS_VM_WRITE
                    | PROCESS_VM_OPERATION
                    | PROCESS_QUERY_INFORMATION
                    | PROCESS_SYNCHRONIZE,
                false,
                pid,
            )
        }
        .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: {}", pid, e)))?;

        debug!("Opened process {} ({})", pid, name);
        Ok(Self {
            pid,
            name,
            handle,
            suspended: Mutex::new(Vec::new()),
        })
    }

    /// Find the first process whose executable name contains `name` and open it
    pub fn find_and_open(name: &str) -> Result<Self> {
        let needle = name.to_ascii_lowercase();
        let process = list_processes()?
            .into_iter()
            .find(|p| p.name.to_ascii_lowercase().contains(&needle))
            .ok_or_else(|| Error::ProcessNotFound(name.to_string()))?;
        Self::open(process.pid)
    }

    fn has_exited(&self) -> bool {
        use windows::Win32::Foundation::WAIT_OBJECT_0;
        use windows::Win32::System::Threading::WaitForSingleObject;

        // SAFETY: zero-timeout wait on a valid process handle only polls its state.
        unsafe { WaitForSingleObject(self.handle, 0) == WAIT_OBJECT_0 }
    }

    fn thread_ids(&self) -> Result<Vec<u32>> {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Diagnostics::ToolHelp::{
            CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First,
            Thread32Next,
        };

        // SAFETY: the snapshot handle is closed before returning.
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0)
                .map_err(|e| Error::Transaction(format!("thread snapshot failed: {}", e)))?;

            let mut entry = THREADENTRY32 {
                dwSize: std::mem::size_of::<THREADENTRY32>() as u32,
                ..Default::default()
            };

            let mut ids = Vec::new();
            if Thread32First(snapshot, &mut entry).is_ok() {
                loop {
                    if entry.th32OwnerProcessID == self.pid {
                        ids.push(entry.th32ThreadID);
                    }
                    if Thread32Next(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }
            let _ = CloseHandle(snapshot);
            Ok(ids)
        }
    }
}

#[cfg(target_os = "windows")]
impl Drop for ProcessHandle {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;

        let pending = self.suspended.get_mut().map(std::mem::take).unwrap_or_default();
        if !pending.is_empty() {
            warn!("Process handle dropped while paused; resuming {} threads", pending.len());
            resume_threads(&pending);
        }
        // SAFETY: the handle was opened by `open` and is closed exactly once.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

/// Result of asking one thread to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThreadPause {
    Suspended,
    /// The thread could not be opened, usually because it already exited
    Exited,
    Failed,
}

/// Suspend every thread in `ids`, or none of them.
///
/// A live thread that refuses to stop, or running past `timeout`, resumes the
/// threads already stopped and fails the pause.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn pause_threads(
    pid: u32,
    ids: &[u32],
    timeout: Duration,
    mut suspend: impl FnMut(u32) -> ThreadPause,
    resume: impl Fn(&[u32]) -> usize,
) -> Result<Vec<u32>> {
    let started = Instant::now();
    let mut suspended = Vec::with_capacity(ids.len());

    for &tid in ids {
        let failure = if started.elapsed() > timeout {
            Some(format!("pausing process {} exceeded {:?}", pid, timeout))
        } else {
            match suspend(tid) {
                ThreadPause::Suspended => {
                    suspended.push(tid);
                    None
                }
                ThreadPause::Exited => {
                    debug!("Thread {} of process {} is gone, skipping", tid, pid);
                    None
                }
                ThreadPause::Failed => {
                    Some(format!("thread {} of process {} could not be suspended", tid, pid))
                }
            }
        };

        if let Some(message) = failure {
            let stuck = resume(&suspended);
            if stuck > 0 {
                warn!("{} threads of process {} stayed suspended", stuck, pid);
            }
            return Err(Error::Transaction(message));
        }
    }

    if suspended.is_empty() {
        return Err(Error::Transaction(format!(
            "no threads of process {} could be suspended",
            pid
        )));
    }
    Ok(suspended)
}

#[cfg(target_os = "windows")]
fn resume_threads(ids: &[u32]) -> usize {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenThread, ResumeThread, THREAD_SUSPEND_RESUME};

    let mut failed = 0;
    for &tid in ids {
        // SAFETY: the thread handle is closed right after use.
        unsafe {
            match OpenThread(THREAD_SUSPEND_RESUME, false, tid) {
                Ok(thread) => {
                    if ResumeThread(thread) == u32::MAX {
                        failed += 1;
                    }
                    let _ = CloseHandle(thread);
                }
                Err(_) => failed += 1,
            }
        }
    }
    failed
}

#[cfg(target_os = "windows")]
impl ReadMemory for ProcessHandle {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

        let mut buffer = vec![0u8; size];
        let mut read = 0usize;
        // SAFETY: the buffer holds `size` bytes and outlives the call.
        unsafe {
            ReadProcessMemory(
                self.handle,
                address as _,
                buffer.as_mut_ptr() as _,
                size,
                Some(&mut read),
            )
        }
        .map_err(|e| Error::MemoryReadFailed {
            address,
            message: e.to_string(),
        })?;

        if read != size {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("short read: {} of {} bytes", read, size),
            });
        }
        Ok(buffer)
    }
}

#[cfg(target_os = "windows")]
impl WriteMemory for ProcessHandle {
    fn write_bytes(&self, address: u64, data: &[u8]) -> Result<()> {
        use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;

        let mut written = 0usize;
        // SAFETY: `data` is a valid slice for the duration of the call.
        unsafe {
            WriteProcessMemory(
                self.handle,
                address as _,
                data.as_ptr() as _,
                data.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| Error::MemoryWriteFailed {
            address,
            message: e.to_string(),
        })?;

        if written != data.len() {
            return Err(Error::MemoryWriteFailed {
                address,
                message: format!("short write: {} of {} bytes", written, data.len()),
            });
        }
        Ok(())
    }
}

#[cfg(target_os = "windows")]
impl ProcessControl for ProcessHandle {
    fn suspend(&self, timeout: Duration) -> Result<()> {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenThread, SuspendThread, THREAD_SUSPEND_RESUME};

        if self.has_exited() {
            return Err(Error::Transaction(format!("process {} has exited", self.pid)));
        }

        let mut suspended = self
            .suspended
            .lock()
            .map_err(|_| Error::Transaction("suspend state poisoned".to_string()))?;

        let paused = pause_threads(
            self.pid,
            &self.thread_ids()?,
            timeout,
            |tid| {
                // SAFETY: the thread handle is closed right after use.
                unsafe {
                    let Ok(thread) = OpenThread(THREAD_SUSPEND_RESUME, false, tid) else {
                        return ThreadPause::Exited;
                    };
                    let outcome = if SuspendThread(thread) == u32::MAX {
                        ThreadPause::Failed
                    } else {
                        ThreadPause::Suspended
                    };
                    let _ = CloseHandle(thread);
                    outcome
                }
            },
            resume_threads,
        )?;
        suspended.extend(paused);

        debug!("Suspended {} threads of process {}", suspended.len(), self.pid);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        let pending = {
            let mut suspended = self
                .suspended
                .lock()
                .map_err(|_| Error::Transaction("suspend state poisoned".to_string()))?;
            std::mem::take(&mut *suspended)
        };

        let failed = resume_threads(&pending);
        if failed > 0 {
            return Err(Error::Transaction(format!(
                "{} of {} threads of process {} could not be resumed",
                failed,
                pending.len(),
                self.pid
            )));
        }

        debug!("Resumed {} threads of process {}", pending.len(), self.pid);
        Ok(())
    }
}

/// List running processes
#[cfg(target_os = "windows")]
pub fn list_processes() -> Result<Vec<ProcessInfo>> {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
        TH32CS_SNAPPROCESS,
    };

    // SAFETY: the snapshot handle is closed before returning.
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
            .map_err(|e| Error::ProcessNotFound(format!("process snapshot failed: {}", e)))?;

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        let mut processes = Vec::new();
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                processes.push(ProcessInfo {
                    pid: entry.th32ProcessID,
                    name: String::from_utf16_lossy(&entry.szExeFile[..len]),
                });
                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
        Ok(processes)
    }
}

// --- Non-Windows stubs ---

#[cfg(not(target_os = "windows"))]
impl ProcessHandle {
    pub fn open(pid: u32) -> Result<Self> {
        Err(Error::ProcessOpenFailed(format!(
            "pid {}: live process access is only supported on Windows",
            pid
        )))
    }

    pub fn find_and_open(name: &str) -> Result<Self> {
        Err(Error::ProcessOpenFailed(format!(
            "{}: live process access is only supported on Windows",
            name
        )))
    }
}

#[cfg(not(target_os = "windows"))]
impl ReadMemory for ProcessHandle {
    fn read_bytes(&self, address: u64, _size: usize) -> Result<Vec<u8>> {
        Err(Error::MemoryReadFailed {
            address,
            message: "unsupported platform".to_string(),
        })
    }
}

#[cfg(not(target_os = "windows"))]
impl WriteMemory for ProcessHandle {
    fn write_bytes(&self, address: u64, _data: &[u8]) -> Result<()> {
        Err(Error::MemoryWriteFailed {
            address,
            message: "unsupported platform".to_string(),
        })
    }
}

#[cfg(not(target_os = "windows"))]
impl ProcessControl for ProcessHandle {
    fn suspend(&self, _timeout: Duration) -> Result<()> {
        Err(Error::Transaction("unsupported platform".to_string()))
    }

    fn resume(&self) -> Result<()> {
        Err(Error::Transaction("unsupported platform".to_string()))
    }
}

#[cfg(not(target_os = "windows"))]
pub fn list_processes() -> Result<Vec<ProcessInfo>> {
    Ok(Vec::new())
}

impl ForeignProcess for ProcessHandle {
    fn describe(&self) -> String {
        format!("{} (pid {})", self.name, self.pid)
    }
}
