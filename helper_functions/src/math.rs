use integer_sqrt::IntegerSquareRoot as _;

// Endianness is not configurable. All protocol integers are little-endian.
pub fn int_to_bytes(int: u64, length: usize) -> Vec<u8> {
    let mut vec = int.to_le_bytes().to_vec();
    vec.resize(length, 0);
    vec
}

pub fn int_to_bytes_32(int: u32, length: usize) -> Vec<u8> {
    let mut vec = int.to_le_bytes().to_vec();
    vec.resize(length, 0);
    vec
}

pub fn bytes_to_int(bytes: [u8; 8]) -> u64 {
    u64::from_le_bytes(bytes)
}

pub fn integer_squareroot(n: u64) -> u64 {
    n.integer_sqrt()
}

pub fn xor(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut result = [0; 32];
    for (i, byte) in result.iter_mut().enumerate() {
        *byte = left[i] ^ right[i];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_to_bytes_value0_length_8() {
        let expected_bytes = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(expected_bytes, int_to_bytes(0, 8).as_slice());
    }

    #[test]
    fn test_int_to_bytes_value2521273052_length_8() {
        let expected_bytes = [0xdc, 0x92, 0x47, 0x96, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(expected_bytes, int_to_bytes(2_521_273_052, 8).as_slice());
    }

    #[test]
    fn test_int_to_bytes_truncates_to_length() {
        assert_eq!(vec![0xff], int_to_bytes(0xff, 1));
    }

    #[test]
    fn test_bytes_to_int_round_trip() {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&int_to_bytes(88_813_769, 8));
        assert_eq!(bytes_to_int(bytes), 88_813_769);
    }

    #[test]
    fn test_integer_squareroot() {
        assert_eq!(integer_squareroot(0), 0);
        assert_eq!(integer_squareroot(1), 1);
        assert_eq!(integer_squareroot(16), 4);
        assert_eq!(integer_squareroot(24), 4);
        assert_eq!(integer_squareroot(25), 5);
        assert_eq!(integer_squareroot(26), 5);
    }

    #[test]
    fn test_xor() {
        let left = [0xff; 32];
        let mut right = [0x00; 32];
        right[7] = 0x0f;
        let mut expected = [0xff; 32];
        expected[7] = 0xf0;
        assert_eq!(xor(&left, &right), expected);
    }
}
