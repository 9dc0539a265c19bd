mod rw;
