// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CUDA backend over the driver API
//!
//! The driver library is opened at runtime, so the binary has no link-time
//! dependency on CUDA and runs (and reports) on hosts without it. Every
//! allocation is wrapped in a guard that frees it and releases the retained
//! primary context on drop.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};

use libloading::Library;

use super::{
    AcceleratorRuntime, DeviceBuffer, DeviceInfo, HostBuffer, RuntimeError, RuntimeResult,
};
use crate::driver::open_library;
use crate::error::{ProbeError, Result};

type CuResult = c_int;
type CuDevice = c_int;
type CuContext = *mut c_void;
type CuDevicePtr = u64;

const CUDA_SUCCESS: CuResult = 0;
const CUDA_ERROR_INVALID_DEVICE: CuResult = 101;

const CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT: c_int = 16;
const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR: c_int = 75;
const CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR: c_int = 76;

const CU_MEMHOSTALLOC_PORTABLE: c_uint = 0x01;

/// Resolved driver entry points. The pointers stay valid while `_lib` lives.
struct CudaApi {
    init: unsafe extern "C" fn(c_uint) -> CuResult,
    device_get_count: unsafe extern "C" fn(*mut c_int) -> CuResult,
    device_get: unsafe extern "C" fn(*mut CuDevice, c_int) -> CuResult,
    device_get_name: unsafe extern "C" fn(*mut c_char, c_int, CuDevice) -> CuResult,
    device_get_attribute: unsafe extern "C" fn(*mut c_int, c_int, CuDevice) -> CuResult,
    device_total_mem: unsafe extern "C" fn(*mut usize, CuDevice) -> CuResult,
    primary_ctx_retain: unsafe extern "C" fn(*mut CuContext, CuDevice) -> CuResult,
    primary_ctx_release: unsafe extern "C" fn(CuDevice) -> CuResult,
    ctx_set_current: unsafe extern "C" fn(CuContext) -> CuResult,
    mem_host_alloc: unsafe extern "C" fn(*mut *mut c_void, usize, c_uint) -> CuResult,
    mem_free_host: unsafe extern "C" fn(*mut c_void) -> CuResult,
    mem_host_get_flags: unsafe extern "C" fn(*mut c_uint, *mut c_void) -> CuResult,
    mem_alloc: unsafe extern "C" fn(*mut CuDevicePtr, usize) -> CuResult,
    mem_free: unsafe extern "C" fn(CuDevicePtr) -> CuResult,
    memcpy_htod: unsafe extern "C" fn(CuDevicePtr, *const c_void, usize) -> CuResult,
    device_can_access_peer: unsafe extern "C" fn(*mut c_int, CuDevice, CuDevice) -> CuResult,
    _lib: Library,
}

/// Copy a function pointer out of `lib`.
///
/// # Safety
/// `T` must match the C signature of `name`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T> {
    lib.get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|e| ProbeError::NativeSymbolMissing {
            symbol: name.to_string(),
            reason: e.to_string(),
        })
}

impl CudaApi {
    fn resolve(lib: Library) -> Result<Self> {
        // SAFETY: each type below mirrors the driver API prototype in cuda.h.
        unsafe {
            let primary_ctx_release = symbol(&lib, "cuDevicePrimaryCtxRelease_v2")
                .or_else(|_| symbol(&lib, "cuDevicePrimaryCtxRelease"))?;
            Ok(Self {
                init: symbol(&lib, "cuInit")?,
                device_get_count: symbol(&lib, "cuDeviceGetCount")?,
                device_get: symbol(&lib, "cuDeviceGet")?,
                device_get_name: symbol(&lib, "cuDeviceGetName")?,
                device_get_attribute: symbol(&lib, "cuDeviceGetAttribute")?,
                device_total_mem: symbol(&lib, "cuDeviceTotalMem_v2")?,
                primary_ctx_retain: symbol(&lib, "cuDevicePrimaryCtxRetain")?,
                primary_ctx_release,
                ctx_set_current: symbol(&lib, "cuCtxSetCurrent")?,
                mem_host_alloc: symbol(&lib, "cuMemHostAlloc")?,
                mem_free_host: symbol(&lib, "cuMemFreeHost")?,
                mem_host_get_flags: symbol(&lib, "cuMemHostGetFlags")?,
                mem_alloc: symbol(&lib, "cuMemAlloc_v2")?,
                mem_free: symbol(&lib, "cuMemFree_v2")?,
                memcpy_htod: symbol(&lib, "cuMemcpyHtoD_v2")?,
                device_can_access_peer: symbol(&lib, "cuDeviceCanAccessPeer")?,
                _lib: lib,
            })
        }
    }
}

fn check(op: &'static str, code: CuResult) -> RuntimeResult<()> {
    if code == CUDA_SUCCESS {
        Ok(())
    } else {
        Err(RuntimeError::Call { op, code })
    }
}

/// Retained primary context made current on the calling thread.
struct PrimaryContext<'a> {
    api: &'a CudaApi,
    device: CuDevice,
}

impl<'a> PrimaryContext<'a> {
    fn enter(api: &'a CudaApi, device: CuDevice) -> RuntimeResult<Self> {
        let mut ctx: CuContext = std::ptr::null_mut();
        // SAFETY: `ctx` is a valid out-pointer for the call.
        check("cuDevicePrimaryCtxRetain", unsafe {
            (api.primary_ctx_retain)(&mut ctx, device)
        })?;
        let guard = Self { api, device };
        // SAFETY: `ctx` was just retained and stays alive until `guard` drops.
        check("cuCtxSetCurrent", unsafe { (api.ctx_set_current)(ctx) })?;
        Ok(guard)
    }
}

impl Drop for PrimaryContext<'_> {
    fn drop(&mut self) {
        // SAFETY: balanced with the retain in `enter`.
        let code = unsafe { (self.api.primary_ctx_release)(self.device) };
        if code != CUDA_SUCCESS {
            tracing::debug!(device = self.device, code, "primary context release failed");
        }
    }
}

struct CudaHostBuffer<'a> {
    api: &'a CudaApi,
    ptr: *mut u8,
    len: usize,
    _ctx: PrimaryContext<'a>,
}

// SAFETY: the allocation is portable page-locked memory owned solely by this
// guard; the driver permits freeing it from any thread.
unsafe impl Send for CudaHostBuffer<'_> {}

impl HostBuffer for CudaHostBuffer<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn is_pinned(&self) -> bool {
        let mut flags: c_uint = 0;
        // SAFETY: `ptr` is a live cuMemHostAlloc allocation.
        let code = unsafe { (self.api.mem_host_get_flags)(&mut flags, self.ptr.cast()) };
        code == CUDA_SUCCESS
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: `ptr` points at `len` bytes owned by this guard.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for CudaHostBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: runs before `_ctx` is released; `ptr` came from cuMemHostAlloc.
        let code = unsafe { (self.api.mem_free_host)(self.ptr.cast()) };
        if code != CUDA_SUCCESS {
            tracing::warn!(code, "cuMemFreeHost failed");
        }
    }
}

struct CudaDeviceBuffer<'a> {
    api: &'a CudaApi,
    ptr: CuDevicePtr,
    len: usize,
    device: usize,
    _ctx: PrimaryContext<'a>,
}

impl DeviceBuffer for CudaDeviceBuffer<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn device(&self) -> usize {
        self.device
    }
}

impl Drop for CudaDeviceBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from cuMemAlloc in the still-retained context.
        let code = unsafe { (self.api.mem_free)(self.ptr) };
        if code != CUDA_SUCCESS {
            tracing::warn!(code, "cuMemFree failed");
        }
    }
}

/// [`AcceleratorRuntime`] backed by the CUDA driver library.
pub struct CudaRuntime {
    api: CudaApi,
    library: String,
}

impl CudaRuntime {
    /// Open the driver library and initialise the driver.
    pub fn load(candidates: &[String]) -> RuntimeResult<Self> {
        let (lib, library) =
            open_library(candidates).map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        let api = CudaApi::resolve(lib).map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        // SAFETY: cuInit takes a flags word that must be zero.
        let code = unsafe { (api.init)(0) };
        if code != CUDA_SUCCESS {
            return Err(RuntimeError::Unavailable(format!(
                "cuInit returned error code {code}"
            )));
        }

        Ok(Self { api, library })
    }

    /// Name of the driver library that was opened.
    pub fn library(&self) -> &str {
        &self.library
    }

    fn device_handle(&self, index: usize) -> RuntimeResult<CuDevice> {
        let ordinal = c_int::try_from(index).map_err(|_| RuntimeError::InvalidDevice(index))?;
        let mut device: CuDevice = 0;
        // SAFETY: `device` is a valid out-pointer.
        let code = unsafe { (self.api.device_get)(&mut device, ordinal) };
        match code {
            CUDA_SUCCESS => Ok(device),
            CUDA_ERROR_INVALID_DEVICE => Err(RuntimeError::InvalidDevice(index)),
            code => Err(RuntimeError::Call {
                op: "cuDeviceGet",
                code,
            }),
        }
    }

    fn attribute(&self, attribute: c_int, device: CuDevice) -> RuntimeResult<u32> {
        let mut value: c_int = 0;
        // SAFETY: `value` is a valid out-pointer.
        check("cuDeviceGetAttribute", unsafe {
            (self.api.device_get_attribute)(&mut value, attribute, device)
        })?;
        Ok(value.max(0) as u32)
    }
}

impl AcceleratorRuntime for CudaRuntime {
    fn backend(&self) -> &str {
        "cuda"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn device_count(&self) -> RuntimeResult<usize> {
        let mut count: c_int = 0;
        // SAFETY: `count` is a valid out-pointer.
        check("cuDeviceGetCount", unsafe {
            (self.api.device_get_count)(&mut count)
        })?;
        Ok(count.max(0) as usize)
    }

    fn device_properties(&self, index: usize) -> RuntimeResult<DeviceInfo> {
        let device = self.device_handle(index)?;

        let mut name_buf = [0 as c_char; 256];
        // SAFETY: the buffer length passed matches the array.
        check("cuDeviceGetName", unsafe {
            (self.api.device_get_name)(name_buf.as_mut_ptr(), name_buf.len() as c_int, device)
        })?;
        // SAFETY: the driver NUL-terminates within the buffer.
        let name = unsafe { CStr::from_ptr(name_buf.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let mut total: usize = 0;
        // SAFETY: `total` is a valid out-pointer.
        check("cuDeviceTotalMem", unsafe {
            (self.api.device_total_mem)(&mut total, device)
        })?;

        Ok(DeviceInfo {
            index,
            name,
            compute_major: self.attribute(CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR, device)?,
            compute_minor: self.attribute(CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR, device)?,
            total_memory_bytes: total as u64,
            multiprocessor_count: self.attribute(CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT, device)?,
        })
    }

    fn alloc_pinned(&self, bytes: usize) -> RuntimeResult<Box<dyn HostBuffer + '_>> {
        let ctx = PrimaryContext::enter(&self.api, self.device_handle(0)?)?;

        let mut ptr: *mut c_void = std::ptr::null_mut();
        // SAFETY: `ptr` is a valid out-pointer; a context is current.
        let code = unsafe { (self.api.mem_host_alloc)(&mut ptr, bytes, CU_MEMHOSTALLOC_PORTABLE) };
        if code != CUDA_SUCCESS || ptr.is_null() {
            return Err(RuntimeError::Allocation(format!(
                "cuMemHostAlloc({bytes}) returned error code {code}"
            )));
        }

        Ok(Box::new(CudaHostBuffer {
            api: &self.api,
            ptr: ptr.cast(),
            len: bytes,
            _ctx: ctx,
        }))
    }

    fn copy_to_device(
        &self,
        device: usize,
        host: &dyn HostBuffer,
    ) -> RuntimeResult<Box<dyn DeviceBuffer + '_>> {
        let ctx = PrimaryContext::enter(&self.api, self.device_handle(device)?)?;

        let mut dptr: CuDevicePtr = 0;
        // SAFETY: `dptr` is a valid out-pointer; a context is current.
        let code = unsafe { (self.api.mem_alloc)(&mut dptr, host.len()) };
        if code != CUDA_SUCCESS {
            return Err(RuntimeError::Transfer(format!(
                "cuMemAlloc({}) returned error code {code}",
                host.len()
            )));
        }

        let buffer = CudaDeviceBuffer {
            api: &self.api,
            ptr: dptr,
            len: host.len(),
            device,
            _ctx: ctx,
        };

        let src = host.as_bytes();
        // SAFETY: `src` is `len` readable bytes; `dptr` has `len` bytes.
        let code = unsafe { (self.api.memcpy_htod)(dptr, src.as_ptr().cast(), src.len()) };
        if code != CUDA_SUCCESS {
            return Err(RuntimeError::Transfer(format!(
                "cuMemcpyHtoD returned error code {code}"
            )));
        }

        Ok(Box::new(buffer))
    }

    fn can_access_peer(&self, device: usize, peer: usize) -> RuntimeResult<bool> {
        let dev = self.device_handle(device)?;
        let peer_dev = self.device_handle(peer)?;
        let mut can_access: c_int = 0;
        // SAFETY: `can_access` is a valid out-pointer.
        check("cuDeviceCanAccessPeer", unsafe {
            (self.api.device_can_access_peer)(&mut can_access, dev, peer_dev)
        })?;
        Ok(can_access != 0)
    }
}
